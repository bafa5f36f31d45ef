//! RTU transport: shared-line request/response correlation
//!
//! One transport owns one serial byte stream. A background task decodes
//! frames off the read half for the transport's whole life; send calls are
//! serialized end-to-end by a single lock, modeling the half-duplex line
//! where at most one exchange can be outstanding.
//!
//! Reader and senders meet at a one-ticket "armed" slot plus a one-slot
//! delivery channel. A send arms the slot with a fresh ticket right after
//! its frame hits the wire; the reader test-and-takes the ticket when a
//! valid frame comes in and hands the frame over tagged with it. A wait
//! that ends without consuming a frame (deadline, error, or the future
//! being dropped) disarms its own ticket on the way out, so a response that
//! shows up late meets an empty slot and dies in the reader instead of
//! leaking into the next caller's wait. On top of that, a frame is only
//! accepted if its receipt timestamp is strictly later than the request's
//! transmission timestamp, which catches frames that were already in flight
//! when the request was sent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::SerialConfig;
use crate::constants::{BROADCAST_SLAVE_ID, EXCEPTION_FLAG};
use crate::error::{ExceptionCode, ModbusError, ModbusResult};
use crate::frame::{self, Frame};

/// A decoded frame on its way from the reader to a waiting send.
#[derive(Debug)]
struct TimedFrame {
    frame: Frame,
    /// Stamped the instant the frame finished validating.
    received_at: Instant,
    /// Ticket of the wait this frame was delivered to.
    ticket: u64,
}

/// Counters shared between the reader task and senders.
#[derive(Debug, Default)]
struct Counters {
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    frame_errors: AtomicU64,
    frames_discarded: AtomicU64,
    timeouts: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// Snapshot of a transport's communication counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    /// Frames the reader could not decode (bad CRC, short reads).
    pub frame_errors: u64,
    /// Valid frames dropped because no wait was entitled to them.
    pub frames_discarded: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Reader-side half of the correlator.
#[derive(Debug)]
struct Correlator {
    /// Ticket of the send currently entitled to the next valid frame.
    armed: Mutex<Option<u64>>,
    counters: Counters,
}

/// Send-side state, all behind the send lock.
struct SendIo {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    resp_rx: mpsc::Receiver<TimedFrame>,
    next_ticket: u64,
}

/// Modbus RTU master transport over an exclusive serial byte stream.
pub struct RtuTransport {
    /// The send lock: held from encode through receipt, one caller at a time.
    io: AsyncMutex<SendIo>,
    correlator: Arc<Correlator>,
    reader: Mutex<Option<JoinHandle<()>>>,
    response_timeout: Duration,
}

impl RtuTransport {
    /// Open a serial port and start the background reader.
    ///
    /// The configuration is validated first; an unsupported value fails here
    /// without touching the device.
    pub fn open(path: &str, config: &SerialConfig) -> ModbusResult<Self> {
        config.validate()?;

        let builder = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .timeout(config.effective_read_timeout());
        let port = tokio_serial::SerialStream::open(&builder)?;

        debug!(path, baud_rate = config.baud_rate, "serial port opened");
        Ok(Self::from_stream(port, config.read_timeout))
    }

    /// Build a transport over any byte stream honoring the serial contract.
    ///
    /// This is the seam the tests use; production code goes through
    /// [`RtuTransport::open`].
    pub fn from_stream<S>(stream: S, response_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (resp_tx, resp_rx) = mpsc::channel(1);
        let correlator = Arc::new(Correlator {
            armed: Mutex::new(None),
            counters: Counters::default(),
        });

        let reader = tokio::spawn(read_loop(read_half, resp_tx, Arc::clone(&correlator)));

        Self {
            io: AsyncMutex::new(SendIo {
                writer: Box::new(write_half),
                resp_rx,
                next_ticket: 1,
            }),
            correlator,
            reader: Mutex::new(Some(reader)),
            response_timeout,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Exactly one transmission per call; retry is the caller's business.
    /// Returns the response payload for read-type functions (byte-count
    /// prefix stripped), `None` for write acknowledgements and broadcasts.
    pub async fn send(&self, request: &Frame) -> ModbusResult<Option<Bytes>> {
        let mut io = self.io.lock().await;
        let counters = &self.correlator.counters;

        let adu = frame::encode(request)?;

        // A frame parked in the slot belongs to an abandoned wait and must
        // not satisfy this one.
        while io.resp_rx.try_recv().is_ok() {
            counters.frames_discarded.fetch_add(1, Ordering::Relaxed);
        }

        let sent_at = Instant::now();
        io.writer.write_all(&adu).await?;
        io.writer.flush().await?;
        counters.requests_sent.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_sent
            .fetch_add(adu.len() as u64, Ordering::Relaxed);
        trace!(
            slave_id = request.slave_id,
            function = request.function,
            "sent {}",
            hex(&adu)
        );

        if request.slave_id == BROADCAST_SLAVE_ID {
            // Broadcast requests are not answered.
            return Ok(None);
        }

        let ticket = io.next_ticket;
        io.next_ticket += 1;
        *self.correlator.armed.lock().unwrap() = Some(ticket);
        let _disarm = DisarmGuard {
            correlator: &self.correlator,
            ticket,
        };

        let response = self.wait_for_match(&mut io, ticket, sent_at).await?;
        counters.responses_received.fetch_add(1, Ordering::Relaxed);

        if response.slave_id != request.slave_id
            || response.function & !EXCEPTION_FLAG != request.function
        {
            return Err(ModbusError::Mismatch {
                expected_slave: request.slave_id,
                expected_function: request.function,
                actual_slave: response.slave_id,
                actual_function: response.function,
            });
        }

        if response.is_exception() {
            let code = response
                .data
                .first()
                .copied()
                .ok_or_else(|| ModbusError::frame("exception response without exception code"))?;
            return Err(ModbusError::Exception {
                function: request.function,
                code: ExceptionCode::from_u8(code),
            });
        }

        if frame::is_read_function(response.function) {
            if response.data.is_empty() {
                return Err(ModbusError::frame("read response without byte count"));
            }
            Ok(Some(response.data.slice(1..)))
        } else {
            // Write echoes and anything else are pure acknowledgements.
            Ok(None)
        }
    }

    /// Wait for a frame belonging to this send, bounded by the response
    /// timeout. Frames failing the ticket or staleness check are dropped and
    /// the wait continues.
    async fn wait_for_match(
        &self,
        io: &mut SendIo,
        ticket: u64,
        sent_at: Instant,
    ) -> ModbusResult<Frame> {
        let counters = &self.correlator.counters;
        let wait = async {
            loop {
                let Some(timed) = io.resp_rx.recv().await else {
                    // Reader gone means the stream is gone.
                    return Err(ModbusError::Io {
                        kind: std::io::ErrorKind::NotConnected,
                        message: "port closed".into(),
                    });
                };
                if accept(&timed, ticket, sent_at) {
                    return Ok(timed.frame);
                }
                counters.frames_discarded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    frame_ticket = timed.ticket,
                    wait_ticket = ticket,
                    "dropping frame left over from an earlier exchange"
                );
            }
        };

        match tokio::time::timeout(self.response_timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                counters.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(ModbusError::timeout(
                    "waiting for response",
                    self.response_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Shut the transport down.
    ///
    /// Blocks until the background reader has fully exited; once this
    /// returns, no reader activity survives. Safe to call more than once.
    pub async fn close(&self) -> ModbusResult<()> {
        let handle = self.reader.lock().unwrap().take();
        if let Some(handle) = handle {
            // The reader may be parked in a serial read that nothing else
            // will interrupt; cancel the task and wait it out.
            handle.abort();
            let _ = handle.await;
        }

        let mut io = self.io.lock().await;
        io.writer.shutdown().await.ok();
        debug!("transport closed");
        Ok(())
    }

    /// Snapshot of the communication counters.
    pub fn stats(&self) -> TransportStats {
        let counters = &self.correlator.counters;
        TransportStats {
            requests_sent: counters.requests_sent.load(Ordering::Relaxed),
            responses_received: counters.responses_received.load(Ordering::Relaxed),
            frame_errors: counters.frame_errors.load(Ordering::Relaxed),
            frames_discarded: counters.frames_discarded.load(Ordering::Relaxed),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
            bytes_sent: counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: counters.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// The deadline applied to every response wait.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }
}

impl Drop for RtuTransport {
    fn drop(&mut self) {
        // Best effort: a transport dropped without close() must not leave
        // the reader running.
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

/// Whether `timed` satisfies the wait identified by `ticket` that
/// transmitted at `sent_at`.
fn accept(timed: &TimedFrame, ticket: u64, sent_at: Instant) -> bool {
    timed.ticket == ticket && timed.received_at > sent_at
}

/// Clears the armed slot when a wait ends without consuming a frame, so a
/// late response cannot be delivered into a future caller's wait.
struct DisarmGuard<'a> {
    correlator: &'a Correlator,
    ticket: u64,
}

impl Drop for DisarmGuard<'_> {
    fn drop(&mut self) {
        let mut armed = self.correlator.armed.lock().unwrap();
        if *armed == Some(self.ticket) {
            *armed = None;
        }
    }
}

/// Decode frames off the line for the transport's lifetime.
///
/// Unreadable frames are logged and skipped; reception never stops for
/// them. Only a disconnect-class stream error ends the loop.
async fn read_loop<R>(mut reader: R, resp_tx: mpsc::Sender<TimedFrame>, correlator: Arc<Correlator>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    loop {
        let frame = match frame::decode(&mut reader).await {
            Ok(frame) => frame,
            Err(err) if err.is_disconnect() => {
                debug!("stream closed, reader exiting: {err}");
                break;
            }
            Err(err) => {
                correlator
                    .counters
                    .frame_errors
                    .fetch_add(1, Ordering::Relaxed);
                warn!("discarding unreadable frame: {err}");
                continue;
            }
        };

        let received_at = Instant::now();
        correlator
            .counters
            .bytes_received
            .fetch_add(frame.data.len() as u64 + 4, Ordering::Relaxed);

        // Test-and-take under the lock so at most one frame is handed to
        // any given wait.
        let ticket = correlator.armed.lock().unwrap().take();
        match ticket {
            Some(ticket) => {
                trace!(
                    ticket,
                    slave_id = frame.slave_id,
                    function = frame.function,
                    "frame matched to waiting request"
                );
                let timed = TimedFrame {
                    frame,
                    received_at,
                    ticket,
                };
                if resp_tx.try_send(timed).is_err() {
                    // Slot still holds a frame no one drained; the sender
                    // will clear it before arming again.
                    correlator
                        .counters
                        .frames_discarded
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                correlator
                    .counters
                    .frames_discarded
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    slave_id = frame.slave_id,
                    function = frame.function,
                    "no request waiting, frame discarded"
                );
            }
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
