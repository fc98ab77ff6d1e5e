//! Background Rx and Tx loops of one open session.
//!
//! Both loops run only while their session is the current one. A device
//! failure inside either loop ends the session through
//! [`Shared::fail_session`], which also stops the peer loop.

use std::sync::Arc;
use tokio::sync::oneshot;

use super::models::PortEvent;
use super::{Link, Shared};
use crate::serial::{CompletionSignal, WaitOutcome};

pub(crate) async fn rx_worker(
    shared: Arc<Shared>,
    link: Link,
    signal: Arc<CompletionSignal>,
    done: oneshot::Sender<()>,
) {
    log::debug!("Rx worker started for session {}", link.session);
    let mut byte = [0u8; 1];

    while shared.is_session(link.session) {
        let outcome = signal.wait(link.device.read(&mut byte), None).await;
        match outcome {
            WaitOutcome::Completed(Ok(0)) => {
                shared.fail_session(&link, "device reported end of stream");
                break;
            }
            WaitOutcome::Completed(Ok(_)) => {
                if !shared.push_rx(link.session, byte[0]) {
                    break;
                }
                shared.callbacks.notify(PortEvent::RxData);
            }
            WaitOutcome::Completed(Err(e)) => {
                shared.fail_session(&link, format!("read failed: {}", e));
                break;
            }
            WaitOutcome::TimedOut | WaitOutcome::Abandoned => {
                shared.fail_session(&link, "read completion abandoned");
                break;
            }
        }
    }

    log::debug!("Rx worker stopped for session {}", link.session);
    let _ = done.send(());
}

pub(crate) async fn tx_worker(shared: Arc<Shared>, link: Link, done: oneshot::Sender<()>) {
    log::debug!("Tx worker started for session {}", link.session);

    'session: while shared.is_session(link.session) {
        link.wake.wait().await;
        if !shared.is_session(link.session) {
            break;
        }
        link.wake.clear();

        // Drain everything admitted so far; wakes raised meanwhile only cause
        // one more pass over a possibly empty queue.
        while let Some(frame) = shared.pop_tx() {
            let len = frame.len();
            let outcome = frame.signal.wait(link.device.write(&frame.data), None).await;
            match outcome {
                WaitOutcome::Completed(Ok(written)) if written == len => {
                    shared.stats.record_tx(len);
                    log::trace!("Wrote {} byte frame", len);
                }
                WaitOutcome::Completed(Ok(written)) => {
                    let reason = format!("short write: {} of {} bytes", written, len);
                    shared.fail_session(&link, reason);
                    break 'session;
                }
                WaitOutcome::Completed(Err(e)) => {
                    shared.fail_session(&link, format!("write failed: {}", e));
                    break 'session;
                }
                WaitOutcome::TimedOut | WaitOutcome::Abandoned => {
                    shared.fail_session(&link, "write completion abandoned");
                    break 'session;
                }
            }
            if !shared.is_session(link.session) {
                break 'session;
            }
        }
    }

    log::debug!("Tx worker stopped for session {}", link.session);
    let _ = done.send(());
}
