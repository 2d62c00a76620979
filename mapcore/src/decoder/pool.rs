//! A bounded pool of workers which decode tiles off the main thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    runtime::{Builder, Runtime},
    sync::{oneshot, Semaphore},
};
use tokio_util::sync::CancellationToken;

use crate::{
    coords::TileKey,
    decoder::{decode_tile, DecodeError, DecodeOptions},
    style::StyleSet,
    tessellation::DecodedTile,
};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("creating the decode runtime failed")]
    Runtime(#[from] std::io::Error),
    #[error("decode pool is shut down")]
    ShutDown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecodePoolSettings {
    pub worker_threads: usize,
    /// Maximum number of tiles which are decoded at the same time.
    pub max_concurrent_decodes: usize,
}

impl Default for DecodePoolSettings {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_concurrent_decodes: 4,
        }
    }
}

type DecodeResult = Result<DecodedTile, DecodeError>;

/// Outcome of polling a [`DecodeHandle`].
#[derive(Debug)]
pub enum DecodePoll {
    Pending,
    Ready(DecodeResult),
    /// The decode was cancelled, or its result was already taken.
    Cancelled,
}

/// Handle of a scheduled decode. Dropping the handle cancels the decode.
#[derive(Debug)]
pub struct DecodeHandle {
    tile_key: TileKey,
    token: CancellationToken,
    receiver: Option<oneshot::Receiver<DecodeResult>>,
}

impl DecodeHandle {
    pub fn tile_key(&self) -> TileKey {
        self.tile_key
    }

    /// Cancels the decode. Calling this more than once, or after the decode finished, has no
    /// effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the result if the decode finished, without blocking.
    pub fn try_take(&mut self) -> DecodePoll {
        if self.token.is_cancelled() {
            self.receiver = None;
            return DecodePoll::Cancelled;
        }
        let Some(receiver) = self.receiver.as_mut() else {
            return DecodePoll::Cancelled;
        };
        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                DecodePoll::Ready(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => DecodePoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.receiver = None;
                DecodePoll::Cancelled
            }
        }
    }
}

impl Drop for DecodeHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Multi-threading with Tokio. Decodes run as blocking tasks, at most
/// [`DecodePoolSettings::max_concurrent_decodes`] at a time.
pub struct DecodePool {
    runtime: Runtime,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl DecodePool {
    pub fn new(settings: &DecodePoolSettings) -> Result<Self, ScheduleError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.worker_threads.max(1))
            .max_blocking_threads(settings.max_concurrent_decodes.max(1))
            .thread_name("mapcore-decode")
            .build()?;
        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_decodes.max(1))),
            shutdown: CancellationToken::new(),
        })
    }

    /// Schedules the decode of `data`. The result is polled with [`DecodeHandle::try_take`].
    pub fn schedule(
        &self,
        tile_key: TileKey,
        data: Vec<u8>,
        style_set: Arc<StyleSet>,
        options: Arc<DecodeOptions>,
    ) -> Result<DecodeHandle, ScheduleError> {
        if self.shutdown.is_cancelled() {
            return Err(ScheduleError::ShutDown);
        }

        let token = self.shutdown.child_token();
        let (sender, receiver) = oneshot::channel();
        let permits = self.permits.clone();
        let task_token = token.clone();

        self.runtime.spawn(async move {
            let permit = tokio::select! {
                _ = task_token.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let decode_token = task_token.clone();
            let result = tokio::task::spawn_blocking(move || {
                if decode_token.is_cancelled() {
                    return None;
                }
                Some(decode_tile(tile_key, &data, &style_set, &options))
            })
            .await;
            drop(permit);

            match result {
                Ok(Some(result)) if !task_token.is_cancelled() => {
                    // The receiver is gone if the handle was dropped meanwhile.
                    let _ = sender.send(result);
                }
                Ok(_) => log::debug!("decode of {tile_key} was cancelled"),
                Err(e) => log::error!("decode of {tile_key} panicked: {e}"),
            }
        });

        Ok(DecodeHandle {
            tile_key,
            token,
            receiver: Some(receiver),
        })
    }

    /// Cancels all scheduled decodes and rejects new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use crate::{
        coords::{TileKey, ZoomLevel},
        decoder::{
            pool::{DecodePoll, DecodePool, DecodePoolSettings, ScheduleError},
            test_data, DecodeOptions,
        },
        style::StyleSet,
    };

    fn style_set() -> Arc<StyleSet> {
        Arc::new(
            StyleSet::from_json(r#"[{ "layer": "water", "technique": "fill" }]"#).unwrap(),
        )
    }

    #[test]
    fn decodes_off_thread() {
        let pool = DecodePool::new(&DecodePoolSettings::default()).unwrap();
        let key = TileKey::new(1, 1, ZoomLevel::new(2)).unwrap();
        let mut handle = pool
            .schedule(
                key,
                test_data::sample_tile(),
                style_set(),
                Arc::new(DecodeOptions::default()),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match handle.try_take() {
                DecodePoll::Pending if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                DecodePoll::Ready(result) => {
                    let decoded = result.unwrap();
                    assert_eq!(decoded.tile_key, key);
                    assert_eq!(decoded.geometries.len(), 1);
                    break;
                }
                other => panic!("unexpected poll result {other:?}"),
            }
        }
        assert!(matches!(handle.try_take(), DecodePoll::Cancelled));
    }

    #[test]
    fn cancel_is_idempotent() {
        let pool = DecodePool::new(&DecodePoolSettings::default()).unwrap();
        let mut handle = pool
            .schedule(
                TileKey::root(),
                test_data::sample_tile(),
                style_set(),
                Arc::new(DecodeOptions::default()),
            )
            .unwrap();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(matches!(handle.try_take(), DecodePoll::Cancelled));
    }

    #[test]
    fn rejects_work_after_shutdown() {
        let pool = DecodePool::new(&DecodePoolSettings::default()).unwrap();
        pool.shutdown();
        let result = pool.schedule(
            TileKey::root(),
            Vec::new(),
            style_set(),
            Arc::new(DecodeOptions::default()),
        );
        assert!(matches!(result, Err(ScheduleError::ShutDown)));
    }
}
