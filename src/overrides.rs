//! Override controller
//!
//! Interactive switches always append a brand-new override node below the
//! target; a previous override is forgotten, never edited or deleted, so the
//! panel never fights the artist over a node they may have repurposed.
//! Preview overrides are the opposite: one node per capture job, updated in
//! place and always deleted when the job ends.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::ManagerConfig;
use crate::error::{HostError, Result, VariantError};
use crate::host::{HostAdapter, NodeHandle, OverrideTag};
use crate::model::{VariantModel, VariantSelection};

/// One override node appended to the host graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideRecord {
    pub target_path: String,
    /// Selections currently authored by the node
    pub selections: Vec<VariantSelection>,
    /// Host handle of the generated node
    pub handle: NodeHandle,
    pub tag: OverrideTag,
    pub created_at: DateTime<Utc>,
}

impl OverrideRecord {
    /// Seconds since the node was created
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

/// Creates interactive overrides and manages preview override nodes
#[derive(Debug)]
pub struct OverrideController {
    interactive_name_hint: String,
    preview_name_hint: String,
    /// Most recent interactive record per target path
    last_interactive: HashMap<String, OverrideRecord>,
    /// Every interactive record of this session, oldest first
    history: Vec<OverrideRecord>,
}

impl OverrideController {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            interactive_name_hint: config.interactive_name_hint.clone(),
            preview_name_hint: config.preview_name_hint.clone(),
            last_interactive: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Author `variant` in `set` on `node` through a new override node
    ///
    /// Validates against `model` first; nothing is mutated when validation
    /// fails. Every successful call grows the graph by exactly one node.
    pub fn set_selection<H: HostAdapter + ?Sized>(
        &mut self,
        host: &mut H,
        model: &VariantModel,
        node: &str,
        set: &str,
        variant: &str,
    ) -> Result<OverrideRecord> {
        let selection = VariantSelection::new(node, set, variant);
        model.validate_selection(&selection)?;

        let target = host
            .resolve(node)
            .ok_or_else(|| HostError::MissingNode(node.to_string()))?;
        let handle = host.append_override_node(
            target,
            OverrideTag::Interactive,
            &self.interactive_name_hint,
            std::slice::from_ref(&selection),
        )?;

        let record = OverrideRecord {
            target_path: node.to_string(),
            selections: vec![selection],
            handle,
            tag: OverrideTag::Interactive,
            created_at: Utc::now(),
        };
        info!("Switched {} {} -> {} via override {}", node, set, variant, handle);

        // The previous record is only forgotten; its node stays in the graph
        if let Some(previous) = self.last_interactive.insert(node.to_string(), record.clone()) {
            debug!("Override {} for {} is no longer tracked", previous.handle, node);
        }
        self.history.push(record.clone());
        Ok(record)
    }

    /// Most recent interactive override for a node
    pub fn last_override(&self, node: &str) -> Option<&OverrideRecord> {
        self.last_interactive.get(node)
    }

    /// All interactive overrides created this session, oldest first
    pub fn history(&self) -> &[OverrideRecord] {
        &self.history
    }

    /// Create the single preview node of a capture job
    pub fn append_preview<H: HostAdapter + ?Sized>(
        &self,
        host: &mut H,
        target_path: &str,
        selections: &[VariantSelection],
    ) -> Result<OverrideRecord> {
        let target = host
            .resolve(target_path)
            .ok_or_else(|| HostError::MissingNode(target_path.to_string()))?;
        let handle = host.append_override_node(
            target,
            OverrideTag::Preview,
            &self.preview_name_hint,
            selections,
        )?;
        debug!("Created preview override {} for {}", handle, target_path);

        Ok(OverrideRecord {
            target_path: target_path.to_string(),
            selections: selections.to_vec(),
            handle,
            tag: OverrideTag::Preview,
            created_at: Utc::now(),
        })
    }

    /// Re-author the selections of an existing preview node in place
    pub fn update_preview<H: HostAdapter + ?Sized>(
        &self,
        host: &mut H,
        record: &mut OverrideRecord,
        selections: &[VariantSelection],
    ) -> Result<()> {
        host.update_override_node(record.handle, selections)?;
        record.selections = selections.to_vec();
        Ok(())
    }

    /// Delete a preview node
    ///
    /// A node that is already gone (the artist deleted its parent) counts as
    /// deleted: nothing is left behind either way.
    pub fn delete_preview<H: HostAdapter + ?Sized>(
        &self,
        host: &mut H,
        record: &OverrideRecord,
    ) -> Result<()> {
        match host.delete_node(record.handle) {
            Ok(()) => {
                debug!(
                    "Deleted preview override {} for {} ({}s old)",
                    record.handle,
                    record.target_path,
                    record.age_seconds(Utc::now())
                );
                Ok(())
            }
            Err(HostError::StaleHandle(_)) => {
                warn!(
                    "Preview override {} for {} was already removed",
                    record.handle, record.target_path
                );
                Ok(())
            }
            Err(e) => Err(VariantError::HostMutation(e)),
        }
    }

    /// Preview-tagged nodes below `root_path` that no live job owns
    ///
    /// These are left behind by a session that died without cleanup.
    pub fn find_orphaned_previews<H: HostAdapter + ?Sized>(
        &self,
        host: &H,
        root_path: &str,
        live: &HashSet<NodeHandle>,
    ) -> Result<Vec<(NodeHandle, String)>> {
        let root = host
            .resolve(root_path)
            .ok_or_else(|| VariantError::NotFound(root_path.to_string()))?;

        let mut orphans = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(info) = host.node_info(handle) else {
                continue;
            };
            if info.override_tag == Some(OverrideTag::Preview) && !live.contains(&handle) {
                orphans.push((handle, info.path));
                continue;
            }
            let mut children = host.list_children(handle);
            children.reverse();
            stack.extend(children);
        }
        Ok(orphans)
    }
}
