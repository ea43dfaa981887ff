use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    New,
    Extracting,
    Extracted,
    Deidentifying,
    Deidentified,
    Analyzing,
    Analyzed,
    Generating,
    Generated,
    Published,
    Failed,
}

impl ItemState {
    /// The forward chain, in order. `Failed` is off-chain.
    pub const CHAIN: [ItemState; 10] = [
        ItemState::New,
        ItemState::Extracting,
        ItemState::Extracted,
        ItemState::Deidentifying,
        ItemState::Deidentified,
        ItemState::Analyzing,
        ItemState::Analyzed,
        ItemState::Generating,
        ItemState::Generated,
        ItemState::Published,
    ];

    /// States the scheduler may pick up: extraction done, not yet generating.
    pub const ELIGIBLE: [ItemState; 3] = [
        ItemState::Extracted,
        ItemState::Deidentified,
        ItemState::Analyzed,
    ];

    /// States that still need work; a batch is drained when none remain.
    pub const UNFINISHED: [ItemState; 8] = [
        ItemState::New,
        ItemState::Extracting,
        ItemState::Extracted,
        ItemState::Deidentifying,
        ItemState::Deidentified,
        ItemState::Analyzing,
        ItemState::Analyzed,
        ItemState::Generating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::New => "new",
            ItemState::Extracting => "extracting",
            ItemState::Extracted => "extracted",
            ItemState::Deidentifying => "deidentifying",
            ItemState::Deidentified => "deidentified",
            ItemState::Analyzing => "analyzing",
            ItemState::Analyzed => "analyzed",
            ItemState::Generating => "generating",
            ItemState::Generated => "generated",
            ItemState::Published => "published",
            ItemState::Failed => "failed",
        }
    }

    fn position(&self) -> Option<usize> {
        Self::CHAIN.iter().position(|s| s == self)
    }

    pub fn next(&self) -> Option<ItemState> {
        self.position().and_then(|i| Self::CHAIN.get(i + 1).copied())
    }

    /// Only the immediate successor is legal, plus `Failed` from any live state.
    pub fn can_transition_to(&self, target: ItemState) -> bool {
        match target {
            ItemState::Failed => *self != ItemState::Failed,
            _ => self.next() == Some(target),
        }
    }

    /// Whether `self` is the in-progress half of a stage.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ItemState::Extracting
                | ItemState::Deidentifying
                | ItemState::Analyzing
                | ItemState::Generating
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Published | ItemState::Failed)
    }

    /// Whether `self` sits at or after `other` on the forward chain.
    pub fn reached(&self, other: ItemState) -> bool {
        match (self.position(), other.position()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Lowest progress value an item in this state can report.
    pub fn progress_floor(&self) -> u8 {
        match self {
            ItemState::New | ItemState::Extracting => 0,
            ItemState::Extracted => 5,
            ItemState::Deidentifying => 5,
            ItemState::Deidentified | ItemState::Analyzing => 45,
            ItemState::Analyzed | ItemState::Generating => 60,
            ItemState::Generated => 95,
            ItemState::Published => 100,
            ItemState::Failed => 0,
        }
    }

    /// States an administrative reset may roll back to: any settled point of
    /// the chain between `Extracted` and `Generated`. `New` is excluded since
    /// nothing moves an item out of it once its upload has been handled.
    pub fn is_reset_target(&self) -> bool {
        matches!(
            self,
            ItemState::Extracted
                | ItemState::Deidentified
                | ItemState::Analyzed
                | ItemState::Generated
        )
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl std::fmt::Display for UnknownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown item state: {}", self.0)
    }
}

impl std::error::Error for UnknownState {}

impl FromStr for ItemState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CHAIN
            .iter()
            .chain(std::iter::once(&ItemState::Failed))
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// A processing stage: the pair of states it moves through and the progress
/// range it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Deidentify,
    Analyze,
    Generate,
    Publish,
}

impl Stage {
    /// State the item must be in before the stage starts.
    pub fn prerequisite(&self) -> ItemState {
        match self {
            Stage::Extract => ItemState::New,
            Stage::Deidentify => ItemState::Extracted,
            Stage::Analyze => ItemState::Deidentified,
            Stage::Generate => ItemState::Analyzed,
            Stage::Publish => ItemState::Generated,
        }
    }

    /// State held while the stage runs. Publishing has none.
    pub fn running(&self) -> Option<ItemState> {
        match self {
            Stage::Extract => Some(ItemState::Extracting),
            Stage::Deidentify => Some(ItemState::Deidentifying),
            Stage::Analyze => Some(ItemState::Analyzing),
            Stage::Generate => Some(ItemState::Generating),
            Stage::Publish => None,
        }
    }

    pub fn done(&self) -> ItemState {
        match self {
            Stage::Extract => ItemState::Extracted,
            Stage::Deidentify => ItemState::Deidentified,
            Stage::Analyze => ItemState::Analyzed,
            Stage::Generate => ItemState::Generated,
            Stage::Publish => ItemState::Published,
        }
    }

    /// Progress sub-range `(start, end)` owned by the stage.
    pub fn progress_range(&self) -> (u8, u8) {
        match self {
            Stage::Extract => (0, 5),
            Stage::Deidentify => (5, 45),
            Stage::Analyze => (45, 60),
            Stage::Generate => (60, 95),
            Stage::Publish => (95, 100),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Deidentify => "deidentify",
            Stage::Analyze => "analyze",
            Stage::Generate => "generate",
            Stage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
