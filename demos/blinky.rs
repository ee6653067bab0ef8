// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use gpio_sysfs::{Controller, Direction, Edge, PollReactor};
use quicli::prelude::*;
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The GPIO line number (e.g. 17 for /sys/class/gpio/gpio17)
    line: u32,
    /// Period in milliseconds
    period_ms: u64,
    /// Duration over which to blink in milliseconds
    duration_ms: u64,
}

fn do_main(args: Cli) -> gpio_sysfs::Result<()> {
    let mut controller = Controller::new(Rc::new(PollReactor::new()));
    controller.set_available_pins(&args.line)?;

    let pin = controller.alloc_pin(args.line, Direction::Output, None, Edge::None)?;

    let duration = Duration::from_millis(args.duration_ms);
    let start_time = Instant::now();
    while start_time.elapsed() < duration {
        sleep(Duration::from_millis(args.period_ms));
        pin.set()?;
        sleep(Duration::from_millis(args.period_ms));
        pin.reset()?;
    }

    controller.release_pin(args.line)
}

fn main() -> CliResult {
    env_logger::init();
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
