//! Plan to snapshot subject mapping
//!
//! Raw and as-at reads map each signed parameter item to one subject.
//! Cohort-maturity reads first consult the retrieval summary and may expand
//! one item into several epoch subjects. When that preflight fails the item
//! falls back to a single subject over its own slice family, never a broad
//! regime-mixing read.

use crate::config::MapperConfig;
use crate::epoch::{segment_epochs, subject_slice_key, EpochSelector};
use crate::error::SnapshotError;
use crate::hash::{Blake3ShortHash, HashService, MemoizedHashService};
use crate::subject::{ReadMode, ReadSpec, SnapshotSubjectRequest, SubjectTarget, EPOCH_GAP_SLICE_KEY};
use crate::summary::{SnapshotSummaryApi, SummaryQuery};
use fetchplan_core::ContextRegistry;
use fetchplan_model::{FetchPlan, FetchPlanItem, ItemType, QuerySignature, SliceDsl};
use futures::future::try_join_all;
use std::sync::Arc;

const HASH_MEMO_CAPACITY: u64 = 10_000;

/// Maps fetch plans to snapshot read requests
#[derive(Clone)]
pub struct SubjectMapper {
    config: MapperConfig,
    hasher: Arc<dyn HashService>,
    summary: Arc<dyn SnapshotSummaryApi>,
    registry: Arc<dyn ContextRegistry + Send + Sync>,
}

impl std::fmt::Debug for SubjectMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectMapper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SubjectMapper {
    /// Mapper with the blake3 short hash, memoised
    #[must_use]
    pub fn new(
        config: MapperConfig,
        summary: Arc<dyn SnapshotSummaryApi>,
        registry: Arc<dyn ContextRegistry + Send + Sync>,
    ) -> Self {
        Self::with_hasher(config, Arc::new(Blake3ShortHash), summary, registry)
    }

    /// Mapper with a custom hash service, memoised
    #[must_use]
    pub fn with_hasher(
        config: MapperConfig,
        hasher: Arc<dyn HashService>,
        summary: Arc<dyn SnapshotSummaryApi>,
        registry: Arc<dyn ContextRegistry + Send + Sync>,
    ) -> Self {
        Self {
            config,
            hasher: Arc::new(MemoizedHashService::new(hasher, HASH_MEMO_CAPACITY)),
            summary,
            registry,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map every signed parameter item of `plan`
    ///
    /// Items are mapped concurrently; subjects come back in plan order.
    /// Case items and unsigned items are skipped.
    ///
    /// # Errors
    /// - `SnapshotError::MissingAsAt` / `MissingSweep` for incomplete specs
    /// - Hash service failures
    /// - Slice family parse failures
    pub async fn map_plan(
        &self,
        plan: &FetchPlan,
        spec: &ReadSpec,
    ) -> Result<Vec<SnapshotSubjectRequest>, SnapshotError> {
        if spec.mode == ReadMode::AsAt && spec.as_at.is_none() {
            return Err(SnapshotError::MissingAsAt);
        }
        let items: Vec<&FetchPlanItem> = plan
            .items
            .iter()
            .filter(|item| item.item_type == ItemType::Parameter)
            .filter(|item| {
                let signed = !item.query_signature.trim().is_empty();
                if !signed {
                    tracing::warn!(item = %item.item_key, "Skipping unsigned item for snapshot read");
                }
                signed
            })
            .collect();

        let mapped = try_join_all(items.into_iter().map(|item| self.map_item(item, spec))).await?;
        let subjects: Vec<SnapshotSubjectRequest> = mapped.into_iter().flatten().collect();
        tracing::info!(
            subjects = subjects.len(),
            read_mode = ?spec.mode,
            "Mapped plan to snapshot subjects"
        );
        Ok(subjects)
    }

    /// Map one item
    ///
    /// # Errors
    /// See [`SubjectMapper::map_plan`].
    pub async fn map_item(
        &self,
        item: &FetchPlanItem,
        spec: &ReadSpec,
    ) -> Result<Vec<SnapshotSubjectRequest>, SnapshotError> {
        let canonical = QuerySignature::parse(&item.query_signature).canonical();
        let core_hash = self.hasher.short_hash(&canonical).await?;
        let param_id = self.config.workspace.param_id(&item.object_id);
        let contexts = SliceDsl::parse(&item.slice_family)?.contexts;
        let own_key = subject_slice_key(&contexts, item.mode, self.config.uncontexted_key_policy);

        let base = SnapshotSubjectRequest {
            subject_id: item.item_key.clone(),
            param_id,
            core_hash,
            read_mode: spec.mode,
            anchor_from: spec.anchor.start,
            anchor_to: spec.anchor.end,
            as_at: spec.as_at.filter(|_| spec.mode == ReadMode::AsAt),
            sweep_from: None,
            sweep_to: None,
            slice_keys: vec![own_key],
            target: SubjectTarget::from(item),
        };

        if spec.mode != ReadMode::CohortMaturity {
            return Ok(vec![base]);
        }

        let sweep = spec.sweep.ok_or_else(|| SnapshotError::MissingSweep {
            item_key: item.item_key.clone(),
        })?;
        let fallback = SnapshotSubjectRequest {
            sweep_from: Some(sweep.start),
            sweep_to: Some(sweep.end),
            ..base.clone()
        };

        let query = SummaryQuery {
            param_id: base.param_id.clone(),
            core_hash: base.core_hash.clone(),
            slice_keys: Vec::new(),
            anchor_from: spec.anchor.start,
            anchor_to: spec.anchor.end,
            sweep_from: sweep.start,
            sweep_to: sweep.end,
        };
        let rows = match self.summary.query(&query).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(
                    item = %item.item_key,
                    error = %err,
                    "Retrieval summary unavailable; reading own slice family only"
                );
                return Ok(vec![fallback]);
            }
        };

        let selector = EpochSelector {
            registry: self.registry.as_ref(),
            query: &contexts,
            mode: item.mode,
            policy: self.config.uncontexted_key_policy,
            max_dimensions: self.config.mece_bound(),
        };
        let epochs = segment_epochs(&rows, sweep, &selector);
        tracing::debug!(item = %item.item_key, epochs = epochs.len(), "Segmented cohort maturity sweep");

        Ok(epochs
            .into_iter()
            .enumerate()
            .map(|(index, epoch)| SnapshotSubjectRequest {
                subject_id: format!("{}#epoch{index}", item.item_key),
                sweep_from: Some(epoch.range.start),
                sweep_to: Some(epoch.range.end),
                slice_keys: epoch
                    .slice_keys
                    .unwrap_or_else(|| vec![EPOCH_GAP_SLICE_KEY.to_string()]),
                ..base.clone()
            })
            .collect())
    }
}
