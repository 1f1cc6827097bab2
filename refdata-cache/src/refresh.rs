//! Batch refresh of cached identifiers.
//!
//! The driver enumerates what the store holds, narrows it by a
//! [`RefreshSelection`], and feeds the result through
//! [`ValueCachingProvider::refresh`] in fixed-size batches so that a full
//! pass never loads the whole cache at once.

use std::collections::{BTreeSet, HashMap};
use std::ops::AddAssign;

use refdata_core::{RefDataResult, ReferenceData, ReferenceDataProvider, ValidationError};
use sha2::{Digest, Sha256};

use crate::traits::FieldValueStore;
use crate::value_cache::ValueCachingProvider;

/// Which cached identifiers a refresh pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSelection {
    /// Every cached identifier.
    All,
    /// Identifiers whose hash falls in `shard_index` of `shard_count`.
    /// Lets several processes split one refresh between them.
    Shard { shard_count: u32, shard_index: u32 },
    /// Identifiers whose cached record holds a value for this field.
    HavingField(String),
}

impl RefreshSelection {
    /// Build a validated shard selection.
    pub fn shard(shard_count: u32, shard_index: u32) -> RefDataResult<Self> {
        let selection = Self::Shard {
            shard_count,
            shard_index,
        };
        selection.validate()?;
        Ok(selection)
    }

    pub fn validate(&self) -> RefDataResult<()> {
        if let Self::Shard {
            shard_count,
            shard_index,
        } = *self
        {
            if shard_count == 0 || shard_index >= shard_count {
                return Err(ValidationError::InvalidShard {
                    shard_index,
                    shard_count,
                }
                .into());
            }
        }
        Ok(())
    }

    fn admits_identifier(&self, identifier: &str) -> bool {
        match *self {
            Self::Shard {
                shard_count,
                shard_index,
            } => shard_of(identifier, shard_count) == shard_index,
            Self::All | Self::HavingField(_) => true,
        }
    }

    fn admits_record(&self, record: &ReferenceData) -> bool {
        match self {
            Self::HavingField(field) => record.field_values().contains(field),
            Self::All | Self::Shard { .. } => true,
        }
    }
}

/// Stable shard assignment: the first eight bytes of the identifier's
/// SHA-256 digest, big-endian, modulo `shard_count`.
pub fn shard_of(identifier: &str, shard_count: u32) -> u32 {
    let digest = Sha256::digest(identifier.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(shard_count.max(1))) as u32
}

/// Outcome counts of a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Identifiers considered.
    pub selected: usize,
    /// Records rewritten because their content changed.
    pub rewritten: usize,
    /// Records left as they were.
    pub unchanged: usize,
    /// Identifiers with nothing cached.
    pub uncached: usize,
    /// Identifiers the upstream left out of its response.
    pub not_returned: usize,
}

impl AddAssign for RefreshSummary {
    fn add_assign(&mut self, other: Self) {
        self.selected += other.selected;
        self.rewritten += other.rewritten;
        self.unchanged += other.unchanged;
        self.uncached += other.uncached;
        self.not_returned += other.not_returned;
    }
}

/// Drives refresh passes over a field-value cache.
pub struct RefreshDriver<'a, P, S: ?Sized> {
    cache: &'a ValueCachingProvider<P, S>,
}

impl<'a, P, S> RefreshDriver<'a, P, S>
where
    P: ReferenceDataProvider,
    S: FieldValueStore + ?Sized,
{
    pub fn new(cache: &'a ValueCachingProvider<P, S>) -> Self {
        Self { cache }
    }

    /// Refresh every cached identifier admitted by `selection`.
    pub async fn run(&self, selection: &RefreshSelection) -> RefDataResult<RefreshSummary> {
        selection.validate()?;

        let candidates: Vec<String> = self
            .cache
            .store()
            .identifiers()
            .await?
            .into_iter()
            .filter(|id| selection.admits_identifier(id))
            .collect();

        tracing::info!(
            selection = ?selection,
            candidates = candidates.len(),
            "Starting refresh pass"
        );

        let mut summary = RefreshSummary::default();
        let batch_size = self.cache.settings().refresh_batch_size.max(1);

        for batch in candidates.chunks(batch_size) {
            let identifiers: BTreeSet<String> = batch.iter().cloned().collect();
            let loaded = self.cache.store().load_field_values(&identifiers).await?;

            let cached: HashMap<String, ReferenceData> = loaded
                .into_iter()
                .filter(|(_, record)| selection.admits_record(record))
                .collect();
            let selected: BTreeSet<String> = match selection {
                RefreshSelection::HavingField(_) => cached.keys().cloned().collect(),
                _ => identifiers,
            };
            if selected.is_empty() {
                continue;
            }

            summary += self.cache.refresh_loaded(&selected, &cached).await?;
        }

        Ok(summary)
    }
}
