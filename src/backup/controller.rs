//! Background runner for backup and restore
//!
//! The controller owns the state a front end polls while an operation runs
//! on a worker thread: the state machine, the progress fraction and the last
//! result. Only one operation runs at a time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::error::{ReceiptsError, ReceiptsResult};

use super::packager::{BackupPackager, BackupReport};
use super::progress::{CancellationToken, ProgressObserver};
use super::restore::{RestoreReport, RestoreUnpacker};

/// Lifecycle of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Idle,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Backup,
    Restore,
}

/// Result of the last finished operation
#[derive(Debug, Clone)]
pub enum Outcome {
    Backup(BackupReport),
    Restore(RestoreReport),
    Failed(String),
}

#[derive(Debug)]
struct Shared {
    state: OperationState,
    kind: Option<OperationKind>,
    progress: f32,
    current: String,
    outcome: Option<Outcome>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: OperationState::Idle,
            kind: None,
            progress: 0.0,
            current: String::new(),
            outcome: None,
        }
    }
}

/// Runs backups and restores off the calling thread
#[derive(Debug, Clone)]
pub struct BackupController {
    packager: BackupPackager,
    unpacker: RestoreUnpacker,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

impl BackupController {
    pub fn new(packager: BackupPackager, unpacker: RestoreUnpacker) -> Self {
        Self {
            packager,
            unpacker,
            shared: Arc::new(Mutex::new(Shared::default())),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> OperationState {
        self.lock().state
    }

    /// Operation currently running or last run
    pub fn kind(&self) -> Option<OperationKind> {
        self.lock().kind
    }

    /// Progress of the running operation in `0.0..=1.0`
    pub fn progress(&self) -> f32 {
        self.lock().progress
    }

    /// File most recently handled
    pub fn current_file(&self) -> String {
        self.lock().current.clone()
    }

    /// Result of the last finished operation
    pub fn outcome(&self) -> Option<Outcome> {
        self.lock().outcome.clone()
    }

    /// Ask the running operation to stop after the current file
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Package the storage roots into `destination` on a worker thread
    pub fn start_backup(&self, destination: PathBuf) -> ReceiptsResult<JoinHandle<()>> {
        let packager = self.packager.clone();
        self.spawn(OperationKind::Backup, move |observer, cancel| {
            packager
                .create_backup(&destination, observer, cancel)
                .map(Outcome::Backup)
        })
    }

    /// Restore `archive` over the storage roots on a worker thread
    pub fn start_restore(&self, archive: PathBuf) -> ReceiptsResult<JoinHandle<()>> {
        let unpacker = self.unpacker.clone();
        self.spawn(OperationKind::Restore, move |observer, cancel| {
            unpacker
                .restore_backup(&archive, observer, cancel)
                .map(Outcome::Restore)
        })
    }

    fn spawn<F>(&self, kind: OperationKind, work: F) -> ReceiptsResult<JoinHandle<()>>
    where
        F: FnOnce(&dyn ProgressObserver, &CancellationToken) -> ReceiptsResult<Outcome>
            + Send
            + 'static,
    {
        {
            let mut shared = self.lock();
            if shared.state == OperationState::InProgress {
                return Err(ReceiptsError::Busy);
            }
            *shared = Shared {
                state: OperationState::InProgress,
                kind: Some(kind),
                ..Shared::default()
            };
        }
        self.cancel.reset();

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("receipts-{}", kind_name(kind)))
            .spawn(move || {
                let progress_state = Arc::clone(&shared);
                let observer = move |fraction: f32, current: &str| {
                    let mut state = progress_state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.progress = fraction;
                    state.current = current.to_string();
                };

                let result = work(&observer, &cancel);
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                match result {
                    Ok(outcome) => {
                        state.state = OperationState::Completed;
                        state.progress = 1.0;
                        state.outcome = Some(outcome);
                    }
                    Err(err) => {
                        tracing::warn!(kind = kind_name(kind), error = %err, "operation failed");
                        state.state = OperationState::Failed;
                        state.outcome = Some(Outcome::Failed(err.to_string()));
                    }
                }
            });

        spawned.map_err(|e| {
            let mut shared = self.lock();
            shared.state = OperationState::Failed;
            shared.outcome = Some(Outcome::Failed(e.to_string()));
            ReceiptsError::Io(format!("Failed to start worker thread: {}", e))
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn kind_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Backup => "backup",
        OperationKind::Restore => "restore",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::category::StorageRoots;
    use crate::backup::collaborators::{Detached, RestoreHooks};
    use crate::backup::DatabaseLifecycle;
    use std::fs;
    use std::path::Path;
    use std::sync::mpsc::{channel, Receiver};
    use tempfile::TempDir;

    fn roots_in(dir: &Path) -> StorageRoots {
        StorageRoots::new(dir.join("db"), dir.join("prefs"), dir.join("images"))
    }

    fn controller_for(dir: &Path, hooks: RestoreHooks) -> BackupController {
        let roots = roots_in(dir);
        BackupController::new(
            BackupPackager::new(roots.clone()),
            RestoreUnpacker::new(roots, hooks),
        )
    }

    /// Holds the database closed until the test lets go
    struct Gate(Mutex<Receiver<()>>);

    impl DatabaseLifecycle for Gate {
        fn close(&self) -> ReceiptsResult<()> {
            let _ = self.0.lock().unwrap().recv();
            Ok(())
        }

        fn reopen(&self) -> ReceiptsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_backup_completes() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("db")).unwrap();
        fs::write(temp.path().join("db/app.db"), b"SQLite format 3\0").unwrap();

        let controller = controller_for(temp.path(), RestoreHooks::detached());
        assert_eq!(controller.state(), OperationState::Idle);

        let destination = temp.path().join("backup.zip");
        controller
            .start_backup(destination.clone())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(controller.state(), OperationState::Completed);
        assert_eq!(controller.kind(), Some(OperationKind::Backup));
        assert_eq!(controller.progress(), 1.0);
        match controller.outcome() {
            Some(Outcome::Backup(report)) => assert_eq!(report.archive_path, destination),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_failed_restore() {
        let temp = TempDir::new().unwrap();
        let controller = controller_for(temp.path(), RestoreHooks::detached());

        controller
            .start_restore(temp.path().join("missing.zip"))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(controller.state(), OperationState::Failed);
        assert!(matches!(controller.outcome(), Some(Outcome::Failed(_))));
    }

    #[test]
    fn test_second_start_is_busy() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("db")).unwrap();
        fs::write(source.path().join("db/app.db"), b"SQLite format 3\0").unwrap();
        let archive = source.path().join("backup.zip");
        controller_for(source.path(), RestoreHooks::detached())
            .start_backup(archive.clone())
            .unwrap()
            .join()
            .unwrap();

        let target = TempDir::new().unwrap();
        let (release, gate) = channel();
        let hooks = RestoreHooks::new(
            Arc::new(Gate(Mutex::new(gate))),
            Arc::new(Detached),
            Arc::new(Detached),
        );
        let controller = controller_for(target.path(), hooks);

        let handle = controller.start_restore(archive).unwrap();
        assert_eq!(controller.state(), OperationState::InProgress);
        assert!(matches!(
            controller.start_backup(target.path().join("other.zip")),
            Err(ReceiptsError::Busy)
        ));

        release.send(()).unwrap();
        handle.join().unwrap();
        assert_eq!(controller.state(), OperationState::Completed);

        // A finished controller can run again
        controller
            .start_backup(target.path().join("again.zip"))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(controller.state(), OperationState::Completed);
    }

    #[test]
    fn test_cancel_before_start_is_cleared() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("db")).unwrap();
        fs::write(temp.path().join("db/app.db"), b"SQLite format 3\0").unwrap();

        let controller = controller_for(temp.path(), RestoreHooks::detached());
        // Cancelling before start has no effect on the next run
        controller.cancel();
        controller
            .start_backup(temp.path().join("backup.zip"))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(controller.state(), OperationState::Completed);
    }
}
