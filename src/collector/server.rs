//! TCP ingestion endpoint for worker statistics pushes.
//!
//! Workers connect and write newline-delimited JSON messages; each message
//! maps to one [`StatsCollector`] call. The server owns nothing but the
//! collector sink: results flow worker -> server -> collector -> controller,
//! never the other way around.

use std::io::{BufRead, BufReader};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StatsIngestError;
use crate::types::{TaskSpan, TimeSample};

use super::StatsCollector;

/// Port range the server randomizes over when no port is pinned.
pub const PORT_RANGE: Range<u16> = 10593..11593;

/// One worker push, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StatsMessage {
    /// Per-record timing report.
    AddTime {
        /// Stratum of the processed record.
        stratum: String,
        /// Identifier of the processed record.
        record_key: String,
        /// Processing time in microseconds.
        micros: u64,
    },
    /// Reduce-side outputs as parallel lists.
    AddReduce {
        /// Stratum keys.
        strata: Vec<String>,
        /// Reduced values, one per stratum key.
        values: Vec<f64>,
        /// Reducer-side variances, one per stratum key.
        variances: Vec<f64>,
    },
    /// Mapper start/duration span.
    AddMapperTime {
        /// Start, milliseconds since the epoch.
        start_ms: u64,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
    /// Reducer start/duration span.
    AddReducerTime {
        /// Start, milliseconds since the epoch.
        start_ms: u64,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}

/// Apply one decoded message to the collector.
fn apply(collector: &StatsCollector, message: StatsMessage) {
    match message {
        StatsMessage::AddTime {
            stratum,
            record_key,
            micros,
        } => collector.add_time(TimeSample {
            stratum,
            record_key,
            micros,
        }),
        StatsMessage::AddReduce {
            strata,
            values,
            variances,
        } => {
            // Already logged by the collector; the connection keeps going.
            let _ = collector.add_reduce(strata, values, variances);
        }
        StatsMessage::AddMapperTime {
            start_ms,
            duration_ms,
        } => collector.add_mapper_time(TaskSpan {
            start_ms,
            duration_ms,
        }),
        StatsMessage::AddReducerTime {
            start_ms,
            duration_ms,
        } => collector.add_reducer_time(TaskSpan {
            start_ms,
            duration_ms,
        }),
    }
}

fn serve_connection(collector: &StatsCollector, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".into());
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(%peer, %err, "stats connection read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StatsMessage>(&line) {
            Ok(message) => apply(collector, message),
            Err(err) => {
                let err = StatsIngestError::Malformed(err.to_string());
                warn!(%peer, %err, "dropping stats push");
            }
        }
    }
}

/// Listening stats server.
///
/// One instance per controller; spawn it, publish [`StatsServer::port`] to
/// the workers, and let it run. Shutdown is only needed when tests want
/// isolation.
#[derive(Debug)]
pub struct StatsServer {
    port: u16,
    stop: Arc<AtomicBool>,
    accept_handle: Option<thread::JoinHandle<()>>,
}

impl StatsServer {
    /// Bind and start serving.
    ///
    /// With `port = None`, tries random ports in [`PORT_RANGE`] until one
    /// binds. Each worker connection gets its own thread; all of them share
    /// the collector sink.
    pub fn spawn(
        collector: Arc<StatsCollector>,
        port: Option<u16>,
    ) -> std::io::Result<StatsServer> {
        let listener = match port {
            Some(port) => TcpListener::bind(("0.0.0.0", port))?,
            None => Self::bind_random()?,
        };
        let port = listener.local_addr()?.port();
        info!(port, "stats server listening");

        let stop = Arc::new(AtomicBool::new(false));
        let accept_stop = Arc::clone(&stop);
        let accept_handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_stop.load(Ordering::Acquire) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let collector = Arc::clone(&collector);
                        thread::spawn(move || serve_connection(&collector, stream));
                    }
                    Err(err) => warn!(%err, "stats server accept failed"),
                }
            }
        });

        Ok(StatsServer {
            port,
            stop,
            accept_handle: Some(accept_handle),
        })
    }

    fn bind_random() -> std::io::Result<TcpListener> {
        let mut rng = rand::rng();
        let span = PORT_RANGE.end - PORT_RANGE.start;
        let mut last_err = None;
        for _ in 0..64 {
            let port = PORT_RANGE.start + rng.random_range(0..span);
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(listener) => return Ok(listener),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "no free stats port")
        }))
    }

    /// Port workers should push to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections. In-flight connections finish on their own.
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wake the blocking accept with a throwaway connection.
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", self.port)) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
