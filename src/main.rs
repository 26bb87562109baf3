#[macro_use]
extern crate log;

use std::env::consts::{ARCH, FAMILY, OS};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use anyhow::Error;
use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};

use crate::program::{Cli, Program};

mod crawler;
mod program;

/// Name of the log file written next to the working directory.
const LOG_NAME: &str = "image_crawler.log";

/// Buffered log file handed to the logger. Flushed at line boundaries and on drop.
struct LogFile {
    inner: Arc<Mutex<BufWriter<std::fs::File>>>,
}

impl LogFile {
    fn open() -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(LOG_NAME)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(64 * 1024, file))),
        })
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to acquire lock"))?;
        let size = writer.write(buf)?;
        if buf.contains(&b'\n') {
            writer.flush()?;
        }
        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to acquire lock"))?;
        writer.flush()
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.inner.lock() {
            let _ = writer.flush();
        }
    }
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    initialize_logger(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    log_system_information();

    Program::new(cli).run()
}

/// Logs to the terminal at `terminal_level` and everything from this crate to the log file.
fn initialize_logger(terminal_level: LevelFilter) {
    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("image_crawler");

    let log_file = match LogFile::open() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open {}: {}. Logging will only output to terminal.", LOG_NAME, e);
            let _ = TermLogger::init(terminal_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);
            return;
        }
    };

    if let Err(e) = CombinedLogger::init(vec![
        TermLogger::new(terminal_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::max(), config.build(), log_file),
    ]) {
        eprintln!("Failed to initialize combined logger: {}. Falling back to terminal-only logging.", e);
        let _ = TermLogger::init(terminal_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);
    }
}

/// Logs information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
