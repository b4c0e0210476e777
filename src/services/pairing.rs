//! Image pair indexer - maps each aerial frame to a block of ground frames
//!
//! Pairing is purely positional over the capture log: the i-th selected
//! aerial frame owns ground frames `[R*i, R*(i+1))` in log order.
//!
//! With strided selection the aerial frame of block i is the one written on
//! the same tick as ground frame `R*i`. A tick logs its ground frames before
//! its aerial frame, so each ground event belongs to the next aerial event.

use crate::domain::capture::CaptureEvent;
use crate::domain::error::{CaptureError, Result};
use crate::domain::types::AgentRole;
use crate::infra::config::{AerialSelection, TailPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const PAIRS_FILE: &str = "pairs.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pairing {
    pub aerial: String,
    pub ground: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingIndex {
    pub ratio: usize,
    pub entries: Vec<Pairing>,
}

impl PairingIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ground block for an aerial file name
    pub fn ground_for(&self, aerial: &str) -> Option<&[String]> {
        self.entries.iter().find(|p| p.aerial == aerial).map(|p| p.ground.as_slice())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::Pairing(format!("serialize pairing index: {e}")))?;
        fs::write(path, json).map_err(|e| CaptureError::write(path, e))?;
        info!(path = %path.display(), entries = self.entries.len(), "pairing_index_written");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePairIndexer {
    ratio: usize,
    tail: TailPolicy,
    selection: AerialSelection,
}

impl ImagePairIndexer {
    pub fn new(ratio: usize) -> Result<Self> {
        if ratio == 0 {
            return Err(CaptureError::Pairing("pairing ratio must be at least 1".to_string()));
        }
        Ok(Self { ratio, tail: TailPolicy::default(), selection: AerialSelection::default() })
    }

    pub fn with_tail(mut self, tail: TailPolicy) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_selection(mut self, selection: AerialSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Build the index from capture events in log order
    pub fn build(&self, events: &[CaptureEvent]) -> Result<PairingIndex> {
        let ground: Vec<String> = events.iter().filter(|e| e.role == AgentRole::Ground).map(CaptureEvent::file_name).collect();
        let aerial: Vec<String> = events.iter().filter(|e| e.role == AgentRole::Aerial).map(CaptureEvent::file_name).collect();
        let total_aerial = aerial.len();
        let selected = match self.selection {
            AerialSelection::All => aerial,
            AerialSelection::Strided => self.block_start_aerials(events),
        };
        self.pair_selected(total_aerial, selected, &ground)
    }

    /// Pair already-separated file name lists, one aerial frame per ground frame
    pub fn pair(&self, aerial: Vec<String>, ground: &[String]) -> Result<PairingIndex> {
        let total_aerial = aerial.len();
        let selected: Vec<String> = match self.selection {
            AerialSelection::All => aerial,
            AerialSelection::Strided => aerial.into_iter().step_by(self.ratio).collect(),
        };
        self.pair_selected(total_aerial, selected, ground)
    }

    /// Aerial frame sharing a tick with each block's first ground frame
    fn block_start_aerials(&self, events: &[CaptureEvent]) -> Vec<String> {
        let mut selected = Vec::new();
        let mut ground_seen = 0usize;
        let mut pending_blocks = 0usize;
        for event in events {
            match event.role {
                AgentRole::Ground => {
                    if ground_seen % self.ratio == 0 {
                        pending_blocks += 1;
                    }
                    ground_seen += 1;
                }
                AgentRole::Aerial => {
                    let name = event.file_name();
                    selected.extend(std::iter::repeat(name).take(pending_blocks));
                    pending_blocks = 0;
                }
            }
        }
        if pending_blocks > 0 {
            warn!(blocks = pending_blocks, "pairing_blocks_without_aerial");
        }
        selected
    }

    fn pair_selected(&self, total_aerial: usize, selected: Vec<String>, ground: &[String]) -> Result<PairingIndex> {
        let mut entries = Vec::with_capacity(selected.len());
        let mut short_blocks = 0usize;
        for (i, aerial) in selected.into_iter().enumerate() {
            let start = (self.ratio * i).min(ground.len());
            let end = (self.ratio * (i + 1)).min(ground.len());
            if end - start < self.ratio {
                if self.tail == TailPolicy::Strict {
                    return Err(CaptureError::Pairing(format!(
                        "aerial frame {aerial} has {} of {} ground frames",
                        end - start,
                        self.ratio
                    )));
                }
                short_blocks += 1;
            }
            entries.push(Pairing { aerial, ground: ground[start..end].to_vec() });
        }

        let paired_ground: usize = entries.iter().map(|p| p.ground.len()).sum();
        if short_blocks > 0 || paired_ground < ground.len() {
            warn!(
                short_blocks = short_blocks,
                unpaired_ground = ground.len() - paired_ground,
                "pairing_blocks_uneven"
            );
        }
        info!(
            aerial_total = total_aerial,
            aerial_selected = entries.len(),
            ground_total = ground.len(),
            ratio = self.ratio,
            "pairing_index_built"
        );
        Ok(PairingIndex { ratio: self.ratio, entries })
    }
}
