/*
 *  main.rs
 *
 *  qnaplcd - front panel, no fuss
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use std::sync::Arc;

use log::{info, error};
use env_logger::Env;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

use qnaplcd::config;
use qnaplcd::display::{self, Lcd};
use qnaplcd::monitor::Monitor;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
///
/// Logs whichever arrives first and returns so main can shut the panel down.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[tokio::main] // Requires the `tokio` runtime with `macros` and `rt-multi-thread` features
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (cfg, cli) = config::load()?;

    if cli.dump_config {
        println!("{}", config::dump(&cfg)?);
        return Ok(());
    }

    // Initialize the logger, RUST_LOG still wins over config
    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - front panel, no fuss", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let Some(lcd) = display::find(&cfg.display()).await else {
        info!("no display found, exiting");
        return Ok(());
    };
    let lcd = Arc::new(lcd);
    let monitor = Monitor::new(Arc::clone(&lcd), &cfg.monitor());

    tokio::select! {
        // Handle Unix signals for graceful shutdown
        result = signal_handler() => {
            if let Err(e) = result {
                error!("signal handling failed: {}", e);
            }
        }
        _ = monitor.run() => {
            error!("display listener ended, shutting down");
        }
    }

    lcd.close().await?;
    info!("bye");
    Ok(())
}
