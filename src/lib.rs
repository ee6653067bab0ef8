// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `gpio-sysfs` crate provides access to GPIO lines through the Linux [sysfs GPIO
//! interface](https://www.kernel.org/doc/Documentation/ABI/obsolete/sysfs-gpio)
//! (`/sys/class/gpio`).
//!
//! A [`Controller`] decides which line numbers the process may use and guarantees that
//! each is held by at most one [`Pin`] at a time. Pins can be driven as outputs, sampled
//! as inputs and, for inputs, watched for rising, falling or both edges. Edge
//! notifications are delivered through a [`Reactor`], the event loop of the host
//! program; [`PollReactor`] is a single-threaded implementation for programs without one.
//!
//! The sysfs interface is deprecated upstream in favour of the GPIO character device,
//! but it is still the only option on many kernels and boards.
//!
//! # Examples
//!
//! Mirror an input to an output whenever the input changes:
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use gpio_sysfs::{Controller, Direction, Edge, PollReactor};
//!
//! # fn main() -> Result<(), gpio_sysfs::Error> {
//! let reactor = Rc::new(PollReactor::new());
//! let mut controller = Controller::new(reactor.clone());
//! controller.set_available_pins(&[4, 17])?;
//!
//! let led = controller.alloc_pin(17, Direction::Output, None, Edge::None)?;
//! let mirror = led.clone();
//! let _button = controller.alloc_pin(
//!     4,
//!     Direction::Input,
//!     Some(Box::new(move |_line, value| {
//!         let _ = mirror.write(value);
//!     })),
//!     Edge::Both,
//! )?;
//!
//! loop {
//!     reactor.poll_once(None)?;
//! }
//! # }
//! ```
//!
//! To read the state of a line once:
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use gpio_sysfs::{Controller, Direction, Edge, PollReactor};
//!
//! # fn main() -> Result<(), gpio_sysfs::Error> {
//! let mut controller = Controller::new(Rc::new(PollReactor::new()));
//! controller.set_available_pins(&[4])?;
//! let pin = controller.alloc_pin(4, Direction::Input, None, Edge::None)?;
//! println!("Value: {}", pin.read()?.as_u8());
//! controller.release_pin(4)?;
//! # Ok(()) }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod errors;

pub mod config;

pub mod uapi;

pub mod line;

pub mod reactor;

mod controller;
mod pin;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use errors::{Error, ErrorCategory, ErrorKind, Result};
pub use line::{Active, Direction, Edge, EdgeCallback, LineOptions, LineValue};
pub use pin::Pin;
pub use reactor::{Interest, PollReactor, Reactor, ReadyHandler, Token};
