//! Beacon validator snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single validator as reported by the beacon API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    /// Validator index.
    pub index: u64,
    /// Validator public key as reported by the beacon node.
    pub public_key: String,
    /// Effective balance in planck.
    pub effective_balance: u64,
    /// Whether the validator was slashed.
    pub slashed: bool,
    /// Activation epoch.
    pub activation_epoch: u64,
    /// Exit epoch, `u64::MAX` while active.
    pub exit_epoch: u64,
}

/// The validators assigned to one slot: the first is the leader, the rest attest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCommittee {
    /// Slot within the epoch.
    pub slot: u64,
    /// Proposing validator key.
    pub leader: String,
    /// Attesting validator keys.
    pub attestors: Vec<String>,
}

/// Point-in-time copy of the validator set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSnapshot {
    /// Epoch the snapshot was taken at.
    pub epoch: u64,
    /// Total validator count reported by the beacon node.
    pub total_size: u64,
    /// Validators fetched.
    pub validators: Vec<Validator>,
    /// Unix time of the snapshot.
    pub updated_at: u64,
}

impl ValidatorSnapshot {
    /// Groups validators into per-slot committees by `index % slots_per_epoch`.
    pub fn slot_committees(&self, slots_per_epoch: u64) -> Vec<SlotCommittee> {
        if slots_per_epoch == 0 {
            return Vec::new();
        }
        let mut slots: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for validator in &self.validators {
            slots
                .entry(validator.index % slots_per_epoch)
                .or_default()
                .push(validator.public_key.clone());
        }
        slots
            .into_iter()
            .filter_map(|(slot, mut keys)| {
                if keys.is_empty() {
                    return None;
                }
                let leader = keys.remove(0);
                Some(SlotCommittee { slot, leader, attestors: keys })
            })
            .collect()
    }
}
