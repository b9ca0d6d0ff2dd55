//! # Memory Configuration
//!
//! Arena and allocator sizes, loaded once at startup from TOML.
//!
//! ```toml
//! [arena]
//! capacity = "32MiB"      # integer bytes or "<n>B|KiB|MiB|GiB"
//! alignment = 16          # optional
//!
//! [persistent]
//! size = "8MiB"
//!
//! [frame]
//! size = "2MiB"
//!
//! [[pool.regions]]        # ascending block size
//! block_size = 64
//! count = 2048
//!
//! [general]               # optional free-list allocator
//! size = "12MiB"
//! min_alignment = 16
//!
//! [[slab.declarations]]   # optional slab allocator
//! block_size = 32
//! count = 1024
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cinder_core::memory::units::{gigabytes, kilobytes, megabytes};
use cinder_core::memory::{Arena, PoolRegion, SlabDeclaration, DEFAULT_ALIGNMENT};
use cinder_core::{MemoryError, MemoryResult};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading or applying a memory config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read memory config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid TOML or does not match the schema.
    #[error("failed to parse memory config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The arena or an allocator rejected the layout.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The layout is inconsistent.
    #[error("invalid memory config: {0}")]
    Invalid(String),
}

/// A byte count written as an integer or a unit-suffixed string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "RawByteSize")]
pub struct ByteSize(pub usize);

impl ByteSize {
    /// The size in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let value: usize = digits
            .parse()
            .map_err(|_| format!("`{text}` does not start with a byte count"))?;
        let scale = match unit.trim() {
            "" | "B" => 1,
            "KiB" => kilobytes(1),
            "MiB" => megabytes(1),
            "GiB" => gigabytes(1),
            other => return Err(format!("unknown size unit `{other}` (use B, KiB, MiB or GiB)")),
        };
        value
            .checked_mul(scale)
            .map(Self)
            .ok_or_else(|| format!("`{text}` overflows"))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        for (scale, unit) in [(gigabytes(1), "GiB"), (megabytes(1), "MiB"), (kilobytes(1), "KiB")] {
            if bytes >= scale && bytes % scale == 0 {
                return write!(f, "{}{unit}", bytes / scale);
            }
        }
        write!(f, "{bytes}B")
    }
}

/// Wire form of [`ByteSize`].
#[derive(Deserialize)]
#[serde(untagged)]
enum RawByteSize {
    Bytes(u64),
    Text(String),
}

impl TryFrom<RawByteSize> for ByteSize {
    type Error = String;

    fn try_from(raw: RawByteSize) -> Result<Self, Self::Error> {
        match raw {
            RawByteSize::Bytes(bytes) => usize::try_from(bytes)
                .map(Self)
                .map_err(|_| format!("{bytes} bytes does not fit this platform")),
            RawByteSize::Text(text) => text.parse(),
        }
    }
}

fn default_alignment() -> usize {
    DEFAULT_ALIGNMENT
}

/// The backing reservation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaConfig {
    /// Total capacity.
    pub capacity: ByteSize,
    /// Alignment of the arena base.
    #[serde(default = "default_alignment")]
    pub alignment: usize,
}

/// A linear allocator section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearConfig {
    /// Section size.
    pub size: ByteSize,
}

/// The pool allocator's regions.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Regions in ascending block-size order.
    pub regions: Vec<PoolRegion>,
}

/// The optional general-purpose free-list allocator.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Section size.
    pub size: ByteSize,
    /// Payload alignment.
    #[serde(default = "default_alignment")]
    pub min_alignment: usize,
}

/// The optional slab allocator.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlabConfig {
    /// Slabs in ascending block-size order.
    pub declarations: Vec<SlabDeclaration>,
}

/// Complete memory layout of the engine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Backing reservation.
    pub arena: ArenaConfig,
    /// Allocator for data living the whole run.
    pub persistent: LinearConfig,
    /// Allocator reset at every frame boundary.
    pub frame: LinearConfig,
    /// Fixed-size block pool.
    pub pool: PoolConfig,
    /// General-purpose allocator, if any.
    #[serde(default)]
    pub general: Option<GeneralConfig>,
    /// Slab allocator, if any.
    #[serde(default)]
    pub slab: Option<SlabConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig {
                capacity: ByteSize(megabytes(16)),
                alignment: DEFAULT_ALIGNMENT,
            },
            persistent: LinearConfig {
                size: ByteSize(megabytes(4)),
            },
            frame: LinearConfig {
                size: ByteSize(megabytes(2)),
            },
            pool: PoolConfig {
                regions: vec![
                    PoolRegion::new(64, 1024),
                    PoolRegion::new(256, 256),
                    PoolRegion::new(1024, 64),
                ],
            },
            general: Some(GeneralConfig {
                size: ByteSize(megabytes(4)),
                min_alignment: DEFAULT_ALIGNMENT,
            }),
            slab: Some(SlabConfig {
                declarations: vec![
                    SlabDeclaration::new(32, 512),
                    SlabDeclaration::new(128, 256),
                    SlabDeclaration::new(512, 64),
                ],
            }),
        }
    }
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed input, [`ConfigError::Invalid`]
    /// if the layout does not fit the arena.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "memory config loaded");
        Ok(config)
    }

    /// Bytes every configured section takes from the arena, or `None` on
    /// overflow.
    #[must_use]
    pub fn required_bytes(&self) -> Option<usize> {
        let pool = blocks_total(self.pool.regions.iter().map(|r| (r.block_size, r.count)))?;
        let slab = match &self.slab {
            Some(slab) => blocks_total(slab.declarations.iter().map(|d| (d.block_size, d.count)))?,
            None => 0,
        };
        let general = self.general.as_ref().map_or(0, |g| g.size.bytes());
        [self.persistent.size.bytes(), self.frame.size.bytes(), pool, general, slab]
            .into_iter()
            .try_fold(0_usize, usize::checked_add)
    }

    /// Checks that the layout is coherent before anything is reserved.
    ///
    /// Block-class shape (minimum size, ordering) is checked by the
    /// allocators themselves when they are built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |what: String| Err(ConfigError::Invalid(what));

        if self.arena.capacity.bytes() == 0 {
            return invalid("arena capacity is zero".into());
        }
        if !self.arena.alignment.is_power_of_two() {
            return invalid(format!(
                "arena alignment {} is not a power of two",
                self.arena.alignment
            ));
        }
        if self.persistent.size.bytes() == 0 || self.frame.size.bytes() == 0 {
            return invalid("persistent and frame sections need a non-zero size".into());
        }
        if self.pool.regions.is_empty() {
            return invalid("at least one pool region is required".into());
        }
        if self.slab.as_ref().is_some_and(|s| s.declarations.is_empty()) {
            return invalid("slab section declares no slabs".into());
        }

        let Some(required) = self.required_bytes() else {
            return invalid("section sizes overflow".into());
        };
        if required > self.arena.capacity.bytes() {
            return invalid(format!(
                "sections need {} but the arena holds {}",
                ByteSize(required),
                self.arena.capacity
            ));
        }
        Ok(())
    }

    /// Reserves an arena with the configured capacity and alignment.
    ///
    /// # Errors
    ///
    /// Returns the arena's reservation error.
    pub fn create_arena(&self) -> MemoryResult<Arena> {
        Arena::with_alignment(self.arena.capacity.bytes(), self.arena.alignment)
    }
}

fn blocks_total(mut classes: impl Iterator<Item = (usize, usize)>) -> Option<usize> {
    classes.try_fold(0_usize, |total, (block_size, count)| {
        total.checked_add(block_size.checked_mul(count)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_parsing() {
        assert_eq!("4096".parse::<ByteSize>(), Ok(ByteSize(4096)));
        assert_eq!("64B".parse::<ByteSize>(), Ok(ByteSize(64)));
        assert_eq!("2 KiB".parse::<ByteSize>(), Ok(ByteSize(2048)));
        assert_eq!("16MiB".parse::<ByteSize>(), Ok(ByteSize(megabytes(16))));
        assert_eq!("1GiB".parse::<ByteSize>(), Ok(ByteSize(gigabytes(1))));
        assert!("MiB".parse::<ByteSize>().is_err());
        assert!("12MB".parse::<ByteSize>().is_err());
        assert!("99999999999999999999GiB".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_byte_size_display() {
        assert_eq!(ByteSize(megabytes(64)).to_string(), "64MiB");
        assert_eq!(ByteSize(kilobytes(3)).to_string(), "3KiB");
        assert_eq!(ByteSize(1500).to_string(), "1500B");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.required_bytes().unwrap() <= config.arena.capacity.bytes());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = MemoryConfig::from_toml_str(
            r#"
            [arena]
            capacity = "1MiB"

            [persistent]
            size = 4096

            [frame]
            size = "8KiB"

            [[pool.regions]]
            block_size = 64
            count = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.arena.alignment, DEFAULT_ALIGNMENT);
        assert_eq!(config.frame.size, ByteSize(kilobytes(8)));
        assert_eq!(config.pool.regions, vec![PoolRegion::new(64, 16)]);
        assert!(config.general.is_none());
        assert!(config.slab.is_none());
    }

    #[test]
    fn test_oversubscribed_config_is_rejected() {
        let err = MemoryConfig::from_toml_str(
            r#"
            [arena]
            capacity = "1MiB"

            [persistent]
            size = "1MiB"

            [frame]
            size = "1KiB"

            [[pool.regions]]
            block_size = 64
            count = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_schema_errors() {
        let unknown_unit = MemoryConfig::from_toml_str(
            r#"
            [arena]
            capacity = "1 parsec"
            [persistent]
            size = 1
            [frame]
            size = 1
            [[pool.regions]]
            block_size = 64
            count = 1
            "#,
        );
        assert!(matches!(unknown_unit, Err(ConfigError::Parse(_))));

        let missing_pool = MemoryConfig::from_toml_str(
            r#"
            [arena]
            capacity = 4096
            [persistent]
            size = 1
            [frame]
            size = 1
            "#,
        );
        assert!(matches!(missing_pool, Err(ConfigError::Parse(_))));
    }
}
