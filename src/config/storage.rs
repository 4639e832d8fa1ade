use std::any::{self, Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::utils::prelude::*;

/// JSON file helpers.
struct JsonFile;

impl JsonFile {
    /// Write the value next to the target first and move it in place once complete,
    /// so an interrupted write never replaces a valid file.
    fn write<T>(value: &T, path: impl AsRef<Path>) -> AnyResult<()>
    where
        T: Serialize,
    {
        let path = path.as_ref();

        let dir = path.parent().with_context(|| {
            format!(
                "Config path does not have a valid parent dir: '{}'",
                path.display()
            )
        })?;

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create dir: '{}'", dir.display()))?;

        let tmp = Self::tmp_path(path);

        let written = Self::write_synced(value, &tmp).and_then(|_| {
            fs::rename(&tmp, path)
                .with_context(|| format!("Failed to replace file: '{}'", path.display()))
        });

        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }

        written
    }

    fn write_synced<T>(value: &T, path: &Path) -> AnyResult<()>
    where
        T: Serialize,
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open file: '{}'", path.display()))?;

        serde_json::to_writer_pretty(&mut file, value)
            .with_context(|| format!("Failed to serialize data: '{}'", path.display()))?;

        file.sync_all()
            .with_context(|| format!("Failed to flush file: '{}'", path.display()))
    }

    /// Sibling path used while writing, eg. `guild.json.tmp`.
    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }

    fn read<T>(path: impl AsRef<Path>) -> AnyResult<T>
    where
        T: DeserializeOwned,
    {
        let path = path.as_ref();
        let mut value = String::new();
        {
            let mut file = OpenOptions::new()
                .read(true)
                .open(path)
                .with_context(|| format!("Failed to open path '{}'", path.display()))?;
            file.read_to_string(&mut value)?;
        }
        serde_json::from_str::<T>(&value)
            .with_context(|| format!("Failed to deserialize data: '{}'", path.display()))
    }

    /// Read a file, or create it with default contents if it does not exist yet.
    ///
    /// A file that exists but does not parse is an error and is left untouched.
    fn read_or_create<T>(path: impl AsRef<Path>) -> AnyResult<T>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        let path = path.as_ref();
        if path.exists() {
            return Self::read::<T>(path);
        }

        info!("Creating a default config: '{}'", path.display());
        let value = T::default();
        Self::write(&value, path).context("Failed to create config file")?;
        Ok(value)
    }

    const fn extension() -> &'static str {
        "json"
    }
}

/// Types that can be kept in the storage.
pub trait Storable: Serialize + DeserializeOwned + Any + Send + 'static {}

impl<T> Storable for T where T: Serialize + DeserializeOwned + Any + Send + 'static {}

type NameMap = HashMap<TypeId, &'static str>;
type DataMap = HashMap<TypeId, Box<dyn Any + Send>>;
type PathMap = HashMap<PathBuf, DataMap>;

/// Configuration data storage.
///
/// Every bound type is a JSON document named by its binding, stored once in the global
/// directory and once per guild directory. Loaded documents are kept in memory.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    names: NameMap,
    data: Mutex<PathMap>,
}

impl Storage {
    pub const DEFAULT_ROOT: &'static str = "./data/";
    const GLOBAL: &'static str = "global";
    const GUILDS: &'static str = "guilds";

    /// Create an empty storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            names: NameMap::new(),
            data: Mutex::default(),
        }
    }

    /// Get global storage.
    ///
    /// # Notes
    /// Returned `Directory` holds a mutex lock to `self`.
    pub fn global(&self) -> AnyResult<Directory<'_>> {
        Ok(Directory {
            dir: self.root.join(Self::GLOBAL),
            names: &self.names,
            data: self.lock()?,
        })
    }

    /// Get guild storage by id.
    ///
    /// # Notes
    /// Returned `Directory` holds a mutex lock to `self`.
    pub fn by_guild_id(&self, guild_id: Id<GuildMarker>) -> AnyResult<Directory<'_>> {
        Ok(Directory {
            dir: self.root.join(Self::GUILDS).join(guild_id.to_string()),
            names: &self.names,
            data: self.lock()?,
        })
    }

    /// Bind a type to a config name.
    ///
    /// # Errors
    /// If type is already bound to a name.
    pub fn bind<T: 'static>(&mut self, name: &'static str) -> AnyResult<()> {
        let id = TypeId::of::<T>();
        let ty_name = any::type_name::<T>();
        match self.names.entry(id) {
            Entry::Occupied(o) => Err(anyhow::anyhow!(
                "Cannot map config name '{name}' to type '{ty_name}', because the type is already \
                 mapped with a different name '{other}'",
                other = o.get()
            )),
            Entry::Vacant(v) => {
                v.insert(name);
                Ok(())
            },
        }
    }

    /// Returns self as a result of storage bindings validation.
    pub fn validated(self) -> AnyResult<Self> {
        let mut seen = HashSet::new();
        match self.names.values().find(|&n| !seen.insert(n.to_lowercase())) {
            Some(n) => Err(anyhow::anyhow!("Duplicate config name found '{n}'")),
            None => Ok(self),
        }
    }

    fn lock(&self) -> AnyResult<MutexGuard<'_, PathMap>> {
        self.data
            .lock()
            .map_err(|_| anyhow::anyhow!("Config storage lock is poisoned"))
    }
}

#[derive(Debug, Error)]
#[error("Value not found for type '{0}'")]
struct ValueNotFoundError(&'static str);

impl ValueNotFoundError {
    fn new<T>() -> Self {
        Self(any::type_name::<T>())
    }
}

/// Represents a directory of configs on disk.
///
/// # Notes
/// This holds a mutex lock to the original storage.
#[derive(Debug)]
pub struct Directory<'a> {
    dir: PathBuf,
    names: &'a NameMap,
    data: MutexGuard<'a, PathMap>,
}

impl Directory<'_> {
    /// Returns a reference to a type from memory, if it exists.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Storable,
    {
        let id = TypeId::of::<T>();
        self.data
            .get(&self.dir)
            .and_then(|d| d.get(&id))
            .and_then(|d| d.downcast_ref())
    }

    /// Get file path of the config, if the type is bound.
    pub fn path<T>(&self) -> AnyResult<PathBuf>
    where
        T: Storable,
    {
        let id = TypeId::of::<T>();
        let ty_name = any::type_name::<T>();
        let mut path = self
            .names
            .get(&id)
            .with_context(|| format!("Missing config file name for '{ty_name}'"))
            .map(|name| self.dir.join(name))?;
        path.set_extension(JsonFile::extension());
        Ok(path)
    }

    /// Modify a type value with a function and write config.
    ///
    /// The value in memory is only replaced once the file has been written.
    pub fn save_with<T, R>(&mut self, f: impl FnOnce(&mut T) -> AnyResult<R>) -> AnyResult<R>
    where
        T: Clone + Default + Storable,
    {
        let mut value = self.load_or_default::<T>()?.clone();
        let out = f(&mut value)?;
        JsonFile::write(&value, self.path::<T>()?)?;
        self.insert(value);
        Ok(out)
    }

    /// Get a type from memory, otherwise try load from config file.
    /// If not found, create default.
    pub fn load_or_default<T>(&mut self) -> AnyResult<&T>
    where
        T: Default + Storable,
    {
        if self.get::<T>().is_none() {
            let value = JsonFile::read_or_create::<T>(self.path::<T>()?)
                .context("Failed to read config file")?;
            self.insert(value);
        }
        self.get::<T>().with_context(|| ValueNotFoundError::new::<T>())
    }

    fn insert<T>(&mut self, value: T)
    where
        T: Storable,
    {
        self.data
            .entry(self.dir.to_owned())
            .or_default()
            .insert(TypeId::of::<T>(), Box::new(value));
    }
}
