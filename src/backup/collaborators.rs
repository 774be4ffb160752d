//! Collaborators signalled around a restore
//!
//! The unpacker never owns the database connection, the preference store or
//! the image loader. It is handed these handles and tells them when to let go
//! of their files and when to pick the new ones up.

use std::sync::Arc;

use crate::error::ReceiptsResult;

/// Owner of the open database connection
pub trait DatabaseLifecycle: Send + Sync {
    /// Close the connection before database files are replaced
    fn close(&self) -> ReceiptsResult<()>;

    /// Reopen the connection once the restore has finished with the database
    fn reopen(&self) -> ReceiptsResult<()>;
}

/// Consumer of the preference files
pub trait PreferenceStore: Send + Sync {
    /// Re-read preferences from disk
    fn reload(&self) -> ReceiptsResult<()>;
}

/// In-memory image cache in front of the image root
pub trait ImageCache: Send + Sync {
    /// Drop every cached image
    fn reset(&self);
}

/// Collaborators for a process that holds no open handles, such as the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl DatabaseLifecycle for Detached {
    fn close(&self) -> ReceiptsResult<()> {
        tracing::debug!("no open database connection to close");
        Ok(())
    }

    fn reopen(&self) -> ReceiptsResult<()> {
        tracing::debug!("no database connection to reopen");
        Ok(())
    }
}

impl PreferenceStore for Detached {
    fn reload(&self) -> ReceiptsResult<()> {
        tracing::debug!("no preference store to reload");
        Ok(())
    }
}

impl ImageCache for Detached {
    fn reset(&self) {
        tracing::debug!("no image cache to reset");
    }
}

/// The set of handles a restore signals
#[derive(Clone)]
pub struct RestoreHooks {
    pub database: Arc<dyn DatabaseLifecycle>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub images: Arc<dyn ImageCache>,
}

impl RestoreHooks {
    pub fn new(
        database: Arc<dyn DatabaseLifecycle>,
        preferences: Arc<dyn PreferenceStore>,
        images: Arc<dyn ImageCache>,
    ) -> Self {
        Self {
            database,
            preferences,
            images,
        }
    }

    /// Hooks that do nothing
    pub fn detached() -> Self {
        Self::new(Arc::new(Detached), Arc::new(Detached), Arc::new(Detached))
    }
}

impl Default for RestoreHooks {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for RestoreHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreHooks").finish_non_exhaustive()
    }
}
