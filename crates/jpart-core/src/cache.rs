//! Bounded cache of open output resources.
//!
//! Many partitions share a small number of open files: the cache hands out a
//! resource per logical name, creating it through a fault callback on a miss
//! and closing the oldest-inserted entry when full. Eviction is strictly
//! first-in-first-out; a hit never changes an entry's position.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::error::{PartitionError, Result};

/// Default bound on concurrently open resources.
pub const DEFAULT_CAPACITY: usize = 100;

/// An open, append-only output stream owned by the cache.
pub trait Resource: Write + Send {
    /// Flush and release the underlying stream. Called exactly once, on
    /// eviction or disposal.
    fn close(&mut self) -> io::Result<()>;
}

pub type BoxedResource = Box<dyn Resource>;

/// Creates the resource for a name the cache does not hold yet.
pub type FaultCallback = Box<dyn FnMut(&str) -> Result<BoxedResource> + Send>;

/// The cache as shared between rules for a run.
pub type SharedCache = Arc<Mutex<ResourceCache>>;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A file opened for append, buffered until closed.
pub struct AppendFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AppendFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Resource for AppendFile {
    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// In-memory resource. Clones share the same buffer and closed flag, so a
/// caller can keep a handle and inspect what the cache wrote.
#[derive(Clone, Default)]
pub struct MemoryResource {
    buffer: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Write for MemoryResource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "resource is closed"));
        }
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer lock poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Resource for MemoryResource {
    fn close(&mut self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Standard fault callback: `name` is a path relative to `output_root`. The
/// parent directories are created when missing and the file is opened for
/// append.
pub fn default_fault_handler(output_root: &Path, name: &str) -> Result<BoxedResource> {
    let filepath = output_root.join(name);

    info!("Opening: [{}]", filepath.display());

    if let Some(dir) = filepath.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    Ok(Box::new(AppendFile::open(&filepath)?))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct ResourceCache {
    capacity: usize,
    /// Names in insertion order, oldest first. Same key set as `index`.
    order: VecDeque<String>,
    index: HashMap<String, BoxedResource>,
    fault_cb: FaultCallback,
}

impl ResourceCache {
    /// Create a cache with [`DEFAULT_CAPACITY`].
    pub fn new<F>(fault_cb: F) -> Self
    where
        F: FnMut(&str) -> Result<BoxedResource> + Send + 'static,
    {
        Self {
            capacity: DEFAULT_CAPACITY,
            order: VecDeque::with_capacity(DEFAULT_CAPACITY),
            index: HashMap::with_capacity(DEFAULT_CAPACITY),
            fault_cb: Box::new(fault_cb),
        }
    }

    pub fn with_capacity<F>(capacity: usize, fault_cb: F) -> Result<Self>
    where
        F: FnMut(&str) -> Result<BoxedResource> + Send + 'static,
    {
        if capacity == 0 {
            return Err(PartitionError::ZeroCapacity);
        }

        Ok(Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            fault_cb: Box::new(fault_cb),
        })
    }

    /// A cache that opens files under `output_root` via [`default_fault_handler`].
    pub fn for_output_root(output_root: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let output_root = output_root.into();
        Self::with_capacity(capacity, move |name| default_fault_handler(&output_root, name))
    }

    pub fn into_shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Cached names, oldest first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Return the resource for `name`, creating it on a miss.
    pub fn get_or_create(&mut self, name: &str) -> Result<&mut dyn Resource> {
        // A hit is taken out of the index and put back; the order list, and
        // so the eviction position, is left as it was.
        let resource = match self.index.remove(name) {
            Some(resource) => resource,
            None => {
                let resource = (self.fault_cb)(name)?;
                self.make_room()?;
                self.order.push_back(name.to_string());
                resource
            }
        };

        let slot = self.index.entry(name.to_string()).or_insert(resource);
        Ok(&mut **slot)
    }

    /// Register an already open resource under `name`.
    pub fn add(&mut self, name: &str, resource: BoxedResource) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(PartitionError::DuplicateResource(name.to_string()));
        }

        self.make_room()?;
        self.order.push_back(name.to_string());
        self.index.insert(name.to_string(), resource);
        Ok(())
    }

    fn make_room(&mut self) -> Result<()> {
        if self.index.len() >= self.capacity {
            self.dispose_oldest()?;
        }
        Ok(())
    }

    /// Evict and close the oldest entry. Returns false if there was none.
    fn dispose_oldest(&mut self) -> Result<bool> {
        let Some(name) = self.order.pop_front() else {
            return Ok(false);
        };

        if let Some(mut resource) = self.index.remove(&name) {
            info!("Closing: [{}]", name);
            resource.close()?;
        }

        Ok(true)
    }

    /// Close every cached resource.
    ///
    /// Returns `Ok(false)` if the cache was already empty. A close failure
    /// does not stop the remaining resources from being closed; the first
    /// failure is returned once the cache is drained.
    pub fn dispose(&mut self) -> Result<bool> {
        if self.index.is_empty() {
            return Ok(false);
        }

        let mut first_error = None;

        // Bounded by capacity so a misbehaving entry can't loop forever.
        for _ in 0..self.capacity {
            match self.dispose_oldest() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("Failed to close resource during dispose: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if !self.index.is_empty() {
            return Err(PartitionError::ResourcesLeaked(self.index.len()));
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }
}
