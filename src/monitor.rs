use crate::error::Result;
use crate::physical::{CancellationToken, PhysicalController};
use crate::virtual_controller::VirtualController;
use std::sync::Arc;

type ChangeCallback = Box<dyn Fn(&VirtualController) + Send>;

/// Keeps one virtual controller current with its physical slot.
///
/// Runs on a dedicated `std::thread`: blocks in `wait_for_change`, then
/// refreshes the controller. Stopping cancels the wait and joins the thread.
pub struct StateChangeMonitor {
    cancel: CancellationToken,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl StateChangeMonitor {
    pub fn start(
        controller: Arc<VirtualController>,
        physical: Arc<dyn PhysicalController>,
    ) -> Result<Self> {
        Self::start_with(controller, physical, Box::new(|_| {}))
    }

    /// Like [`start`](Self::start), calling `on_change` after every refresh
    /// that applied a new reading.
    pub fn start_with(
        controller: Arc<VirtualController>,
        physical: Arc<dyn PhysicalController>,
        on_change: ChangeCallback,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = controller.id();

        let handle = std::thread::Builder::new()
            .name(format!("padbridge-monitor-{}", id))
            .spawn(move || {
                log::info!("State change monitor for controller {} started", id);

                let mut last_seen = physical.current_state(id);
                if controller.refresh_state() {
                    on_change(&controller);
                }
                while physical.wait_for_change(id, last_seen, &token) {
                    last_seen = physical.current_state(id);
                    if controller.refresh_state() {
                        on_change(&controller);
                    }
                }

                log::info!("State change monitor for controller {} stopped", id);
            })?;

        Ok(Self {
            cancel,
            thread_handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for StateChangeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Axis;
    use crate::keyboard::tests::RecordingSink;
    use crate::mapper::builtin_mapper;
    use crate::physical::{PhysicalControllerHub, PhysicalReading};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn refreshes_on_published_change_and_stops() {
        let hub = Arc::new(PhysicalControllerHub::new());
        let controller = Arc::new(VirtualController::new(
            1,
            Arc::new(builtin_mapper("StandardGamepad").unwrap()),
            hub.clone(),
            Arc::new(RecordingSink::default()),
        ));

        let (tx, rx) = mpsc::channel();
        let mut monitor = StateChangeMonitor::start_with(
            controller.clone(),
            hub.clone(),
            Box::new(move |c| {
                let _ = tx.send(c.state().axis(Axis::X));
            }),
        )
        .unwrap();
        assert!(monitor.is_running());

        hub.publish(
            1,
            0,
            PhysicalReading {
                thumb_lx: 1234,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1234);

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(controller.state().axis(Axis::X), 1234);
    }
}
