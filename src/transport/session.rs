//! Async driver for [`RtcController`].
//!
//! One tokio task owns the controller and multiplexes portal events, the
//! controller's timers and a stop signal. The controller is never shared.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::core::{ContentObject, Interest, Portal, TimeSource};

use super::controller::RtcController;
use super::error::{RtcError, RtcResult};

/// Default capacity of the portal event queue.
pub const DEFAULT_EVENT_QUEUE: usize = 256;

/// Event delivered by the portal.
#[derive(Debug, Clone)]
pub enum PortalEvent {
    /// Data or NACK for a sent Interest.
    ContentObject(ContentObject),
    /// A sent Interest expired.
    Timeout(Interest),
}

/// Handle for feeding and stopping a running [`RtcSession`].
#[derive(Debug)]
pub struct SessionHandle {
    events: mpsc::Sender<PortalEvent>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SessionHandle {
    /// Queue a portal event.
    pub async fn deliver(&self, event: PortalEvent) -> RtcResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| RtcError::SessionClosed)
    }

    /// Sender for portal events; can be cloned into the portal's I/O task.
    pub fn event_sender(&self) -> mpsc::Sender<PortalEvent> {
        self.events.clone()
    }

    /// Stop the session. Pending timers do not fire.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Runs one controller on the current task.
pub struct RtcSession<P, T> {
    controller: RtcController<P, T>,
    events: mpsc::Receiver<PortalEvent>,
    stop_rx: oneshot::Receiver<()>,
}

impl<P: Portal, T: TimeSource> RtcSession<P, T> {
    /// Wrap a controller. The returned handle feeds and stops it.
    pub fn new(controller: RtcController<P, T>) -> (Self, SessionHandle) {
        Self::with_queue(controller, DEFAULT_EVENT_QUEUE)
    }

    /// Wrap a controller with a custom event queue capacity.
    pub fn with_queue(controller: RtcController<P, T>, capacity: usize) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let session = Self {
            controller,
            events: events_rx,
            stop_rx,
        };
        let handle = SessionHandle {
            events: events_tx,
            stop_tx: Some(stop_tx),
        };
        (session, handle)
    }

    /// Start retrieval and run until stopped.
    ///
    /// Returns the stopped controller, which can be resumed later, or the
    /// first fatal error. Dropping the handle stops the session.
    pub async fn run(self) -> RtcResult<RtcController<P, T>> {
        let Self {
            mut controller,
            mut events,
            mut stop_rx,
        } = self;

        if !controller.is_running() {
            controller.start();
        }

        loop {
            let timer = controller.time_to_next_deadline();

            tokio::select! {
                biased;

                _ = &mut stop_rx => {
                    debug!("session stop requested");
                    break;
                }

                event = events.recv() => match event {
                    Some(PortalEvent::ContentObject(content)) => {
                        if let Err(e) = controller.on_content_object(content) {
                            warn!(error = %e, fatal = e.is_fatal(), "session failed");
                            controller.stop();
                            return Err(e);
                        }
                    }
                    Some(PortalEvent::Timeout(interest)) => controller.on_timeout(&interest),
                    None => {
                        debug!("portal closed");
                        break;
                    }
                },

                _ = tokio::time::sleep(timer.unwrap_or_default()), if timer.is_some() => {
                    controller.on_timers();
                }
            }
        }

        controller.stop();
        Ok(controller)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::core::{MIN_PROBE_SEQ, Name, ReadCallback, SystemClock};
    use crate::transport::{ConsumerConfig, NackHeader, RtcReassembly, encode_data_payload};

    #[derive(Debug, Clone, Default)]
    struct SharedPortal(Arc<Mutex<Vec<Interest>>>);

    impl SharedPortal {
        fn suffixes(&self) -> Vec<u32> {
            self.0.lock().unwrap().iter().map(Interest::suffix).collect()
        }
    }

    impl Portal for SharedPortal {
        fn send_interest(&mut self, interest: Interest) {
            self.0.lock().unwrap().push(interest);
        }

        fn is_interest_pending(&self, _name: &Name) -> bool {
            false
        }
    }

    struct Discard;

    impl ReadCallback for Discard {
        fn is_buffer_movable(&self) -> bool {
            true
        }
        fn read_buffer_available(&mut self, _buffer: Vec<u8>) {}
        fn get_read_buffer(&mut self) -> Option<&mut [u8]> {
            None
        }
        fn read_data_available(&mut self, _len: usize) {}
    }

    fn name() -> Name {
        "b001::7".parse().unwrap()
    }

    fn session(
        config: ConsumerConfig,
        reassembly: RtcReassembly,
    ) -> (RtcSession<SharedPortal, SystemClock>, SessionHandle, SharedPortal) {
        let portal = SharedPortal::default();
        let controller =
            RtcController::new(config, portal.clone(), SystemClock::new(), Box::new(reassembly));
        let (session, handle) = RtcSession::new(controller);
        (session, handle, portal)
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig::builder().network_name(name()).build().unwrap()
    }

    fn data(seq: u32) -> PortalEvent {
        let payload = encode_data_payload(SystemClock::new().now_ms(), b"frame");
        PortalEvent::ContentObject(ContentObject::new(name().with_suffix(seq), 1, payload))
    }

    async fn wait_for(portal: &SharedPortal, pred: impl Fn(&[u32]) -> bool) {
        for _ in 0..200 {
            if pred(&portal.suffixes()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("portal never reached the expected state: {:?}", portal.suffixes());
    }

    #[tokio::test]
    async fn test_session_delivers_and_stops() {
        let (session, mut handle, portal) =
            session(config(), RtcReassembly::with_callback(Box::new(Discard)));
        let task = tokio::spawn(session.run());

        wait_for(&portal, |s| s.contains(&0)).await;
        handle.deliver(data(0)).await.unwrap();
        wait_for(&portal, |s| s.contains(&1) && s.contains(&2)).await;

        handle.stop();
        let controller = task.await.unwrap().unwrap();
        assert!(!controller.is_running());
        assert_eq!(controller.state().last_received, 0);

        // Closed queue
        assert!(matches!(
            handle.deliver(data(1)).await,
            Err(RtcError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_session_timeouts_and_nacks() {
        let (session, mut handle, portal) =
            session(config(), RtcReassembly::with_callback(Box::new(Discard)));
        let task = tokio::spawn(session.run());
        wait_for(&portal, |s| s.contains(&0)).await;

        let nack = NackHeader::new(40, 100_000).to_bytes().to_vec();
        handle
            .deliver(PortalEvent::ContentObject(ContentObject::new(
                name().with_suffix(0),
                1,
                nack,
            )))
            .await
            .unwrap();
        wait_for(&portal, |s| s.contains(&41)).await;

        handle
            .deliver(PortalEvent::Timeout(Interest::new(
                name().with_suffix(41),
                Duration::from_secs(1),
            )))
            .await
            .unwrap();
        // Retransmitted at once: no path timing yet
        wait_for(&portal, |s| s.iter().filter(|&&x| x == 41).count() >= 2).await;

        handle.stop();
        let controller = task.await.unwrap().unwrap();
        assert_eq!(controller.state().last_seg_nacked, 40);
    }

    #[tokio::test]
    async fn test_session_fires_probe_timer() {
        let config = ConsumerConfig::builder()
            .network_name(name())
            .probe_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let (session, mut handle, portal) =
            session(config, RtcReassembly::with_callback(Box::new(Discard)));
        let task = tokio::spawn(session.run());

        wait_for(&portal, |s| s.iter().filter(|&&x| x >= MIN_PROBE_SEQ).count() >= 3).await;
        handle.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_fatal_error() {
        let (session, handle, portal) = session(config(), RtcReassembly::new());
        let task = tokio::spawn(session.run());

        wait_for(&portal, |s| s.contains(&0)).await;
        handle.deliver(data(0)).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, RtcError::ReadCallbackNotInstalled));
    }

    #[tokio::test]
    async fn test_dropped_handle_ends_session() {
        let (session, handle, _portal) =
            session(config(), RtcReassembly::with_callback(Box::new(Discard)));
        drop(handle);

        let mut controller = session.run().await.unwrap();
        assert!(!controller.is_running());

        controller.resume();
        assert!(controller.is_running());
    }
}
