/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Subscriber setup for applications embedding the kernel.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::common::TracingConfig;

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. With `log_to_file` set, output goes
/// through a non-blocking rolling-file writer and the returned guard must be
/// kept alive for buffered lines to be flushed. Returns `None` for the guard
/// when logging to stdout, and silently keeps an already-installed subscriber.
pub fn init_tracing(config: &TracingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = FmtSubscriber::builder()
        .with_span_events(FmtSpan::NONE)
        .compact()
        .with_line_number(true)
        .with_target(true)
        .with_env_filter(filter);

    if config.log_to_file {
        let directory = expand_home(&config.log_directory);
        if let Err(e) = std::fs::create_dir_all(&directory) {
            eprintln!("could not create log directory {}: {e}", directory.display());
            return None;
        }
        let appender = RollingFileAppender::new(Rotation::NEVER, directory, &config.log_file);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let subscriber = builder.with_ansi(false).with_writer(writer).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return None;
        }
        Some(guard)
    } else {
        let _ = tracing::subscriber::set_global_default(builder.finish());
        None
    }
}
