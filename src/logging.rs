//! Tracing subscriber set-up from [`LoggingConfig`].

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogSink, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. `level_override` wins over the configured
/// level; an unparsable level falls back to `info`.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let level = level_override.unwrap_or(&config.level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let layers = build_layers(config)?;
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("impossible d'installer le subscriber de logs")?;
    Ok(())
}

/// One fmt layer per sink; console on stderr when no sink is configured.
fn build_layers(config: &LoggingConfig) -> Result<Vec<BoxedLayer>> {
    let console = [LogSink::Console];
    let sinks = if config.sinks.is_empty() {
        &console[..]
    } else {
        &config.sinks[..]
    };

    sinks
        .iter()
        .map(|sink| match sink {
            LogSink::Console => Ok(fmt_layer(
                config.format,
                BoxMakeWriter::new(std::io::stderr),
                true,
            )),
            LogSink::File { path } => {
                let file = open_log_file(path)?;
                Ok(fmt_layer(
                    config.format,
                    BoxMakeWriter::new(Mutex::new(file)),
                    false,
                ))
            }
        })
        .collect()
}

fn fmt_layer(format: LogFormat, writer: BoxMakeWriter, ansi: bool) -> BoxedLayer {
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("impossible de créer le dossier de logs {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("impossible d'ouvrir le fichier de logs {:?}", path))
}
