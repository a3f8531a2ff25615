use crossbeam_channel::{Sender, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Background thread that waits on submissions so their
/// `on_submitted_work_done` callbacks fire without the render thread polling.
pub(crate) struct Poller {
    tx: Option<Sender<wgpu::SubmissionIndex>>,
    thread: Option<JoinHandle<()>>,
    device: Arc<wgpu::Device>,
}

impl Poller {
    pub(crate) fn spawn(device: Arc<wgpu::Device>) -> Self {
        let (tx, rx) = unbounded::<wgpu::SubmissionIndex>();
        let worker = Arc::clone(&device);
        let spawned = std::thread::Builder::new()
            .name("wgpu-poller".into())
            .spawn(move || {
                for index in rx {
                    let _ = worker.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
                }
                tracing::debug!("poller exiting");
            });
        match spawned {
            Ok(thread) => Self {
                tx: Some(tx),
                thread: Some(thread),
                device,
            },
            Err(e) => {
                tracing::warn!("poller thread failed to start, polling inline: {e}");
                Self {
                    tx: None,
                    thread: None,
                    device,
                }
            }
        }
    }

    /// Make sure callbacks registered up to `index` eventually run.
    pub(crate) fn watch(&self, index: wgpu::SubmissionIndex) {
        let index = match &self.tx {
            Some(tx) => match tx.send(index) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => index,
        };
        let _ = self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Flush whatever was submitted last so no completion is lost.
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}
