//! Lazy-loaded relation handle.
//!
//! A [`LazyRelation<T>`] sits on a mapped struct wherever the schema
//! declares a relationship. It starts life unloaded; the preload engine can
//! inject a batch-fetched value directly (`with_loaded`), or a caller can
//! attach a one-off loader closure and pull the value on demand (`load`).

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Error;

type LoaderFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync>;

/// The state machine behind a [`LazyRelation`].
pub enum LoadState<T> {
    NotLoaded,
    Loading,
    Loaded(T),
    Failed(Arc<Error>),
}

impl<T: Clone> Clone for LoadState<T> {
    fn clone(&self) -> Self {
        match self {
            LoadState::NotLoaded => LoadState::NotLoaded,
            LoadState::Loading => LoadState::Loading,
            LoadState::Loaded(v) => LoadState::Loaded(v.clone()),
            LoadState::Failed(e) => LoadState::Failed(Arc::clone(e)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LoadState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::NotLoaded => write!(f, "NotLoaded"),
            LoadState::Loading => write!(f, "Loading"),
            LoadState::Loaded(v) => write!(f, "Loaded({v:?})"),
            LoadState::Failed(e) => write!(f, "Failed({e})"),
        }
    }
}

/// A relation value that may not have been fetched yet.
pub struct LazyRelation<T> {
    state: LoadState<T>,
    loader: Option<LoaderFn<T>>,
}

impl<T> LazyRelation<T> {
    /// A handle with nothing loaded and no way to load it yet. This is the
    /// state a freshly-decoded row's relation fields start in; the
    /// repository attaches a loader (or the preload engine injects a value)
    /// afterwards.
    pub fn not_loaded() -> Self {
        Self {
            state: LoadState::NotLoaded,
            loader: None,
        }
    }

    /// Attach (or replace) the closure `load` will call on a miss.
    ///
    /// Always resets the handle back to `NotLoaded`, even if it currently
    /// holds a `Loaded` value. This matters because a freshly-constructed
    /// entity's default constructor may have already set a relation field to
    /// `Loaded(default)` (an empty vec, say) before the row mapper gets a
    /// chance to attach the real loader; without the reset, a subsequent
    /// `load()` would return that stale default instead of querying.
    /// Row mapping always attaches loaders before the preload engine has a
    /// chance to call [`Self::with_loaded`], so this ordering never clobbers
    /// a genuine preload result.
    pub fn attach_loader<F>(&mut self, loader: F)
    where
        F: Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self.state = LoadState::NotLoaded;
    }

    /// Inject an already-fetched value directly, bypassing any attached
    /// loader. This is how the preload engine fills in the result of its
    /// batched `WHERE fk IN (...)` query.
    pub fn with_loaded(mut self, value: T) -> Self {
        self.state = LoadState::Loaded(value);
        self
    }

    pub fn set_loaded(&mut self, value: T) {
        self.state = LoadState::Loaded(value);
    }

    /// `true` once a value (successful or not) has been resolved.
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    /// Read the cached value without triggering a load. Returns `None` in
    /// every state but `Loaded`.
    pub fn peek(&self) -> Option<&T> {
        match &self.state {
            LoadState::Loaded(v) => Some(v),
            _ => None,
        }
    }

    /// Resolve the value, fetching it through the attached loader on a
    /// first miss and caching the result (success or failure) for
    /// subsequent calls. Calling this with nothing loaded and no loader
    /// attached is a programmer error: the entity was never preloaded and
    /// nobody ever wired up on-demand fetching for it.
    pub async fn load(&mut self) -> Result<&T, Error>
    where
        T: Clone,
    {
        match &self.state {
            LoadState::Loaded(_) => {}
            LoadState::Failed(e) => return Err((**e).clone_as_error()),
            LoadState::NotLoaded | LoadState::Loading => {
                let loader = self.loader.clone().ok_or_else(|| {
                    Error::NotImplemented(
                        "relation has no attached loader and was not preloaded".to_string(),
                    )
                })?;
                self.state = LoadState::Loading;
                match loader().await {
                    Ok(value) => self.state = LoadState::Loaded(value),
                    Err(err) => {
                        let shared = Arc::new(err);
                        self.state = LoadState::Failed(Arc::clone(&shared));
                        return Err((*shared).clone_as_error());
                    }
                }
            }
        }
        match &self.state {
            LoadState::Loaded(v) => Ok(v),
            _ => unreachable!("state was just set to Loaded or an error was returned"),
        }
    }
}

impl<T: Clone> Clone for LazyRelation<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyRelation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRelation").field("state", &self.state).finish()
    }
}

impl<T> Default for LazyRelation<T> {
    fn default() -> Self {
        Self::not_loaded()
    }
}

/// `Error` does not implement `Clone` (it wraps `sqlx::Error`), but a
/// `LazyRelation` needs to hand the same failure back on repeated `load()`
/// calls. This renders the cached error back into a fresh owned `Error`
/// without needing the original to be `Clone`.
trait ClonableError {
    fn clone_as_error(&self) -> Error;
}

impl ClonableError for Error {
    fn clone_as_error(&self) -> Error {
        Error::InternalError(self.to_string())
    }
}
