//! Request loop.
//!
//! A reader task parses input lines and forwards them over a bounded
//! channel. The loop applies each request to the [`NanInterface`] and writes
//! the reply followed by any notifications it produced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nan_core::{ConfigRequest, EnableRequest, NanInterface};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::NanmgrConfig;
use crate::error::{NanmgrError, Result};
use crate::firmware::SimulatedFirmware;
use crate::output::{self, Output};
use crate::script::{self, Request};

/// How often the loop checks the shutdown flag while idle.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

type Parsed = Result<(usize, Request)>;

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub requests: usize,
    pub parse_errors: usize,
    pub notifications: usize,
}

pub struct NanDaemon {
    nan: NanInterface,
    firmware: Arc<SimulatedFirmware>,
    channel_depth: usize,
}

impl NanDaemon {
    pub fn new(config: &NanmgrConfig) -> Self {
        let firmware = Arc::new(SimulatedFirmware::new());
        let nan = NanInterface::new(config.limits, firmware.clone());
        Self {
            nan,
            firmware,
            channel_depth: config.daemon.channel_depth.max(1),
        }
    }

    pub fn interface(&self) -> &NanInterface {
        &self.nan
    }

    pub fn firmware(&self) -> &SimulatedFirmware {
        &self.firmware
    }

    /// Applies one request and returns its output lines in order.
    pub fn apply(&self, line: usize, request: Request) -> Vec<Output> {
        let op = request.op();
        let reply = |reply| Output::Reply { line, reply };

        let first = match request {
            Request::Enable {
                transaction_id,
                master_preference,
                disc_mac_addr_rand_interval,
            } => reply(self.nan.enable(EnableRequest::from_raw(
                transaction_id,
                master_preference,
                disc_mac_addr_rand_interval,
            ))),
            Request::Disable { transaction_id } => reply(self.nan.disable(transaction_id)),
            Request::SetConfig {
                transaction_id,
                master_preference,
                disc_mac_addr_rand_interval,
            } => reply(self.nan.set_config(ConfigRequest::from_raw(
                transaction_id,
                master_preference,
                disc_mac_addr_rand_interval,
            ))),
            Request::GetCapabilities { transaction_id } => {
                let (reply, capabilities) = self.nan.get_capabilities(transaction_id);
                Output::Capabilities {
                    line,
                    reply,
                    capabilities,
                }
            }
            Request::Publish(req) => reply(self.nan.publish(req)),
            Request::PublishCancel {
                transaction_id,
                publish_id,
            } => reply(self.nan.publish_cancel(transaction_id, publish_id)),
            Request::Subscribe(req) => reply(self.nan.subscribe(req)),
            Request::SubscribeCancel {
                transaction_id,
                subscribe_id,
            } => reply(self.nan.subscribe_cancel(transaction_id, subscribe_id)),
            Request::TransmitFollowup(req) => reply(self.nan.transmit_followup(req)),
            Request::DataPathInitiate(req) => reply(self.nan.data_path_initiate(req)),
            Request::DataPathRespond(req) => reply(self.nan.data_path_respond(req)),
            Request::DataPathEnd {
                transaction_id,
                ndp_instance_ids,
            } => reply(self.nan.data_path_end(transaction_id, &ndp_instance_ids)),
            Request::NdpSetup {
                ndp_instance_id,
                result,
            } => Output::indication(line, op, self.nan.accept_or_reject(ndp_instance_id, result)),
            Request::NdpRequested(indication) => {
                Output::indication(line, op, self.nan.data_path_requested(indication))
            }
            Request::Terminated { target, reason } => {
                Output::indication(line, op, self.nan.terminate(target, reason))
            }
            Request::FollowupStatus { match_key, reason } => Output::indication(
                line,
                op,
                self.nan.deliver_followup_completion(match_key, reason),
            ),
            Request::MatchExpired { service_id } => {
                Output::indication(line, op, self.nan.match_expired(service_id))
            }
            Request::DiscoveryEngine(event) => {
                Output::indication(line, op, self.nan.discovery_engine_event(event))
            }
            Request::Dump => Output::Snapshot {
                line,
                snapshot: self.nan.snapshot(),
            },
        };

        let mut outputs = vec![first];
        outputs.extend(
            self.nan
                .take_notifications()
                .into_iter()
                .map(|notification| Output::Notification { notification }),
        );
        outputs
    }

    /// Runs until `input` is exhausted or `shutdown` is set.
    pub async fn run<R, W>(
        &self,
        input: R,
        mut out: W,
        shutdown: Arc<AtomicBool>,
    ) -> Result<RunStats>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::channel(self.channel_depth);
        let reader = tokio::spawn(read_requests(input, tx));
        let mut stats = RunStats::default();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("nanmgrd: Received shutdown signal");
                break;
            }

            tokio::select! {
                item = rx.recv() => {
                    let Some(item) = item else {
                        debug!("nanmgrd: Input closed");
                        break;
                    };
                    let outputs = match item {
                        Ok((line, request)) => {
                            stats.requests += 1;
                            self.apply(line, request)
                        }
                        Err(NanmgrError::Script { line, message }) => {
                            stats.parse_errors += 1;
                            warn!(line, error = %message, "nanmgrd: Skipping unparsable request");
                            vec![Output::Error { line, message }]
                        }
                        Err(e) => {
                            reader.abort();
                            return Err(e);
                        }
                    };
                    for output in &outputs {
                        if matches!(output, Output::Notification { .. }) {
                            stats.notifications += 1;
                        }
                        write_line(&mut out, output).await?;
                    }
                }
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {}
            }
        }

        reader.abort();
        out.flush().await?;
        info!(
            requests = stats.requests,
            parse_errors = stats.parse_errors,
            notifications = stats.notifications,
            "nanmgrd: Request loop finished"
        );
        Ok(stats)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, output: &Output) -> Result<()> {
    let mut line = output::to_json_line(output)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn read_requests<R: AsyncRead + Unpin>(input: R, tx: mpsc::Sender<Parsed>) {
    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0;

    loop {
        let item = match lines.next_line().await {
            Ok(Some(line)) => {
                line_no += 1;
                match script::parse_line(line_no, &line) {
                    Ok(Some(request)) => Ok((line_no, request)),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                }
            }
            Ok(None) => break,
            Err(e) => Err(NanmgrError::Io(e)),
        };

        let fatal = matches!(item, Err(NanmgrError::Io(_)));
        if tx.send(item).await.is_err() || fatal {
            break;
        }
    }
}
