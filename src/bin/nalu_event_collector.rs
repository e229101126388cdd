//! CLI entry point: wires the library's pipeline to a real UDP socket, a
//! console logger, and a `-b`/`-h` flag surface (spec.md §6). Hand-rolled
//! argument parsing, matching the rest of the example pack's no-CLI-crate
//! convention for a surface this small.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use nalu_collector::{Collector, CollectorConfig};

fn print_help() {
    println!("Usage: nalu_event_collector [options]");
    println!("Options:");
    println!("  -b    Run the collector in background mode");
    println!("  -h    Show this help message");
}

/// Parses `-b`/`-h` from `args` (excluding argv[0]). Returns the background
/// flag, or an error for any unrecognized option.
fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<bool, ()> {
    let mut background = false;
    for arg in args {
        match arg.as_str() {
            "-b" => background = true,
            "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                log::error!("unrecognized option: {other}");
                print_help();
                return Err(());
            }
        }
    }
    Ok(background)
}

fn main() {
    env_logger::init();

    let background = match parse_args(std::env::args().skip(1)) {
        Ok(b) => b,
        Err(()) => std::process::exit(1),
    };

    let config = CollectorConfig::default();
    let collector = Arc::new(Collector::new(config));

    if let Err(e) = collector.start(background) {
        log::error!("failed to start collector: {e}");
        std::process::exit(1);
    }

    if background {
        sleep(Duration::from_secs(10));
        collector.stop();
    } else {
        for _ in 0..10 {
            sleep(Duration::from_millis(10));
            collector.collect();

            let events = collector.new_events();
            collector.print_performance_stats();

            println!("Summary of Events Received:");
            println!("Total events received: {}", events.len());
            println!("-------------------------------------------");

            collector.clear_events();
        }
        collector.stop();
    }
}
