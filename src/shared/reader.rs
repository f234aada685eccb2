// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, Image, PixelFormat, Size};
use core::ops::ControlFlow;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{RecvTimeoutError, SyncSender, TrySendError, sync_channel},
    },
    thread::JoinHandle,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("image queue is full")]
    Full,
    #[error("surface was abandoned by its reader")]
    Abandoned,
}

/// Producer end of an [`ImageReader`], handed to the HAL as a capture target.
#[derive(Clone, Debug)]
pub struct ImageSurface {
    id: u64,
    size: Size,
    format: PixelFormat,
    tx: SyncSender<Image>,
}

impl ImageSurface {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Never blocks: when every buffer is in use the image is refused.
    pub fn queue_image(&self, image: Image) -> Result<(), SurfaceError> {
        match self.tx.try_send(image) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SurfaceError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SurfaceError::Abandoned),
        }
    }
}

/// What a reader's worker observed on one poll.
#[derive(Debug)]
pub enum Acquired {
    Image(Image),
    TimedOut,
}

/// A bounded image queue drained by its own worker thread.
pub struct ImageReader {
    surface: ImageSurface,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ImageReader {
    /// Spawns the worker. `listener` runs on it for every image, and with
    /// [`Acquired::TimedOut`] whenever `poll` elapses without one; returning
    /// `Break` ends the worker.
    pub fn spawn<F>(
        name: &str,
        size: Size,
        format: PixelFormat,
        max_images: usize,
        poll: Duration,
        mut listener: F,
    ) -> Result<Self, CameraError>
    where
        F: FnMut(Acquired) -> ControlFlow<()> + Send + 'static,
    {
        let (tx, rx) = sync_channel::<Image>(max_images.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let surface = ImageSurface {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            size,
            format,
            tx,
        };

        let stop2 = Arc::clone(&stop);
        let surface_id = surface.id;
        let join = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                debug!(surface_id, "image reader started");
                while !stop2.load(Ordering::Acquire) {
                    let acquired = match rx.recv_timeout(poll) {
                        Ok(image) => Acquired::Image(image),
                        Err(RecvTimeoutError::Timeout) => Acquired::TimedOut,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    if stop2.load(Ordering::Acquire) {
                        break;
                    }
                    if listener(acquired).is_break() {
                        break;
                    }
                }
                debug!(surface_id, "image reader stopped");
            })
            .map_err(|e| CameraError::driver("spawning image reader thread", e))?;

        Ok(Self {
            surface,
            stop,
            join: Some(join),
        })
    }

    pub fn surface(&self) -> ImageSurface {
        self.surface.clone()
    }

    pub fn surface_id(&self) -> u64 {
        self.surface.id
    }

    /// Stops the worker and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.thread().id() == std::thread::current().id() {
                return;
            }
            if join.join().is_err() {
                warn!(surface_id = self.surface.id, "image reader worker panicked");
            }
        }
    }
}

impl Drop for ImageReader {
    fn drop(&mut self) {
        // Detaches; the worker notices within one poll interval.
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Plane;
    use bytes::Bytes;
    use std::sync::mpsc::channel;

    fn image(width: u32, height: u32) -> Image {
        Image {
            format: PixelFormat::Jpeg,
            width,
            height,
            planes: vec![Plane {
                data: Bytes::from_static(b"jpeg"),
                row_stride: 0,
                pixel_stride: 0,
            }],
            timestamp_ns: 0,
        }
    }

    #[test]
    fn full_queue_refuses_images() {
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let reader = ImageReader::spawn(
            "test-reader",
            Size::new(4, 4),
            PixelFormat::Jpeg,
            1,
            Duration::from_millis(20),
            move |acquired| {
                if let Acquired::Image(_) = acquired {
                    let _ = started_tx.send(());
                    let _ = release_rx.recv();
                }
                ControlFlow::Continue(())
            },
        )
        .unwrap();
        let surface = reader.surface();

        surface.queue_image(image(4, 4)).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // The worker is busy with the first image; one more fits in the queue.
        surface.queue_image(image(4, 4)).unwrap();
        assert!(matches!(surface.queue_image(image(4, 4)), Err(SurfaceError::Full)));

        drop(release_tx);
        reader.shutdown();
    }

    #[test]
    fn listener_sees_timeouts_and_can_stop() {
        let (tx, rx) = channel();
        let reader = ImageReader::spawn(
            "test-reader",
            Size::new(4, 4),
            PixelFormat::Jpeg,
            1,
            Duration::from_millis(10),
            move |acquired| {
                let _ = tx.send(matches!(acquired, Acquired::TimedOut));
                ControlFlow::Break(())
            },
        )
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        reader.shutdown();
    }

    #[test]
    fn surfaces_are_uniquely_identified() {
        let spawn = || {
            ImageReader::spawn(
                "test-reader",
                Size::new(4, 4),
                PixelFormat::Yuv420,
                2,
                Duration::from_millis(10),
                |_| ControlFlow::Continue(()),
            )
            .unwrap()
        };
        let (a, b) = (spawn(), spawn());
        assert_ne!(a.surface_id(), b.surface_id());
        assert_eq!(a.surface().size(), Size::new(4, 4));
        a.shutdown();
        b.shutdown();
    }
}
