// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Print every edge seen on a set of input lines until the timeout expires.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Context;
use gpio_sysfs::{Controller, ControllerConfig, Direction, Edge, LineValue, PollReactor};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// JSON controller configuration; defaults to /sys/class/gpio with the given lines
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Edge to wait for: rising, falling or both
    #[structopt(long, default_value = "both", parse(try_from_str = parse_edge))]
    edge: Edge,
    /// Seconds to watch for
    #[structopt(long, default_value = "30")]
    seconds: u64,
    /// The GPIO line numbers to watch
    lines: Vec<u32>,
}

fn parse_edge(s: &str) -> anyhow::Result<Edge> {
    match s {
        "rising" => Ok(Edge::Rising),
        "falling" => Ok(Edge::Falling),
        "both" => Ok(Edge::Both),
        other => anyhow::bail!("unknown edge {other:?}"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::from_args();

    let mut config = match &args.config {
        Some(path) => ControllerConfig::load_from_file(path)?,
        None => ControllerConfig::default(),
    };
    if config.available_pins.is_empty() {
        config.available_pins = args.lines.clone();
    }

    let reactor = Rc::new(PollReactor::new());
    let mut controller = Controller::from_config(reactor.clone(), &config)?;

    for &line in &args.lines {
        controller
            .alloc_pin(
                line,
                Direction::Input,
                Some(Box::new(|line: u32, value: LineValue| {
                    println!("line {line:>3}: {}", value.as_u8());
                })),
                args.edge,
            )
            .with_context(|| format!("allocating line {line}"))?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        reactor.poll_once(Some(remaining))?;
    }

    controller.release_all()?;
    Ok(())
}
