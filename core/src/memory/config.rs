//! Memory manager configuration.

use std::path::Path;

use serde::Deserialize;

use super::error::MemoryError;
use super::page::MAX_PAGE_TABLE_CAPACITY;
use super::raw::MAX_ALIGNMENT;

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Largest heap a single system allocation can describe, including the
/// alignment slack a raw block adds.
const MAX_HEAP_BYTES: u64 = isize::MAX as u64 - MAX_ALIGNMENT;

/// Start-up parameters for a [`MemoryManager`](super::MemoryManager).
///
/// Can be loaded from TOML; missing keys fall back to the defaults:
///
/// ```toml
/// heap_size_mib = 64
/// page_table_capacity = 8192
/// heap_alignment = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Initial page heap size in MiB.
    pub heap_size_mib: u64,
    /// Number of page records the page table can hold.
    pub page_table_capacity: u64,
    /// Alignment of the heap base. Must be a power of two no larger than 256.
    pub heap_alignment: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            heap_size_mib: 32,
            page_table_capacity: 4096,
            heap_alignment: MAX_ALIGNMENT,
        }
    }
}

impl MemoryConfig {
    /// Set the initial heap size in MiB.
    pub fn with_heap_size_mib(mut self, heap_size_mib: u64) -> Self {
        self.heap_size_mib = heap_size_mib;
        self
    }

    /// Set the page table capacity in records.
    pub fn with_page_table_capacity(mut self, entries: u64) -> Self {
        self.page_table_capacity = entries;
        self
    }

    /// Set the minimum alignment of the heap base.
    pub fn with_heap_alignment(mut self, alignment: u64) -> Self {
        self.heap_alignment = alignment;
        self
    }

    /// Initial heap size in bytes, saturating on overflow.
    ///
    /// [`MemoryConfig::validate`] rejects sizes for which this saturates.
    pub fn heap_size_bytes(&self) -> u64 {
        self.heap_size_mib.saturating_mul(MIB)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, MemoryError> {
        let config: Self = toml::from_str(text).map_err(|e| MemoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, MemoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Check that the values can be used to start a manager.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.heap_size_mib == 0 {
            return Err(MemoryError::Config("heap_size_mib must be non-zero".into()));
        }
        match self.heap_size_mib.checked_mul(MIB) {
            Some(bytes) if bytes <= MAX_HEAP_BYTES => {}
            _ => {
                return Err(MemoryError::Config(format!(
                    "heap_size_mib {} exceeds the addressable maximum of {} MiB",
                    self.heap_size_mib,
                    MAX_HEAP_BYTES / MIB
                )));
            }
        }
        if self.page_table_capacity < 2 {
            return Err(MemoryError::Config(
                "page_table_capacity must be at least 2".into(),
            ));
        }
        if self.page_table_capacity > MAX_PAGE_TABLE_CAPACITY {
            return Err(MemoryError::Config(format!(
                "page_table_capacity must not exceed {MAX_PAGE_TABLE_CAPACITY}"
            )));
        }
        if !self.heap_alignment.is_power_of_two() || self.heap_alignment > MAX_ALIGNMENT {
            return Err(MemoryError::Config(format!(
                "heap_alignment must be a power of two no larger than {MAX_ALIGNMENT}"
            )));
        }
        Ok(())
    }
}
