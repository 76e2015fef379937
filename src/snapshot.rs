//! Save and restore of volatile interrupt state
//!
//! A snapshot captures the state that arrives from outside the hart
//! and is not reconstructible from CSRs: the latched external pending
//! bitmap, the software-asserted pending bits, the latched input net
//! levels, the per-interrupt CLIC records and the cluster cliccfg.
//!
//! The derived caches (the pending-and-enabled summary bitmap and
//! both selection caches) are deliberately not stored: restore
//! rebuilds them from the loaded records and runs a full
//! re-selection, so a snapshot taken on one version of the selection
//! code replays correctly on another.

use thiserror::Error;

use crate::clic::ClicIntState;
use crate::cluster::Cluster;
use crate::hart::NetValues;
use crate::host::Host;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot has {found} harts but the cluster has {expected}")]
    HartCountMismatch { expected: usize, found: usize },
    #[error(
        "snapshot has {found} CLIC interrupts but hart {hart} has {expected}"
    )]
    ClicShapeMismatch { hart: u32, expected: u32, found: u32 },
    #[error("snapshot and cluster disagree about CLIC presence")]
    ClicPresenceMismatch,
}

/// Volatile state of one hart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HartSnapshot {
    /// Externally-asserted pending bitmap
    pub ip: Vec<u64>,
    /// Software-asserted pending bits
    pub swip: u64,
    /// Latched input net levels
    pub nets: NetValues,
    /// Packed {ip, ie, attr, ctl} words, one per CLIC interrupt
    pub clic_words: Option<Vec<u32>>,
}

/// Volatile state of the whole cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub cliccfg: u8,
    pub harts: Vec<HartSnapshot>,
}

pub fn save(cluster: &Cluster) -> ClusterSnapshot {
    let harts = cluster
        .harts
        .iter()
        .map(|hart| HartSnapshot {
            ip: hart.ip.clone(),
            swip: hart.swip,
            nets: hart.net_value,
            clic_words: hart.clic.as_ref().map(|clic| {
                (0..clic.interrupt_count())
                    .map(|id| clic.state(id).pack())
                    .collect()
            }),
        })
        .collect();
    ClusterSnapshot {
        cliccfg: cluster.cliccfg().map_or(0, |cfg| cfg.as_raw()),
        harts,
    }
}

/// Load a snapshot back into a cluster of the same shape. The
/// pending-and-enabled summaries are rebuilt and a full re-selection
/// runs on every hart.
pub fn restore<H: Host>(
    cluster: &mut Cluster,
    host: &mut H,
    snapshot: &ClusterSnapshot,
) -> Result<(), SnapshotError> {
    if snapshot.harts.len() != cluster.harts.len() {
        return Err(SnapshotError::HartCountMismatch {
            expected: cluster.harts.len(),
            found: snapshot.harts.len(),
        });
    }
    for (hart, saved) in cluster.harts.iter().zip(snapshot.harts.iter()) {
        match (&hart.clic, &saved.clic_words) {
            (Some(clic), Some(words)) => {
                if words.len() != clic.interrupt_count() as usize {
                    return Err(SnapshotError::ClicShapeMismatch {
                        hart: hart.id,
                        expected: clic.interrupt_count(),
                        found: words.len() as u32,
                    });
                }
            }
            (None, None) => {}
            _ => return Err(SnapshotError::ClicPresenceMismatch),
        }
    }

    cluster.load_cliccfg(snapshot.cliccfg);
    for (hart, saved) in
        cluster.harts.iter_mut().zip(snapshot.harts.iter())
    {
        hart.ip.clone_from(&saved.ip);
        hart.swip = saved.swip;
        hart.net_value = saved.nets;
        if let (Some(clic), Some(words)) =
            (hart.clic.as_mut(), &saved.clic_words)
        {
            for (id, word) in words.iter().enumerate() {
                clic.load_state(id as u32, ClicIntState::unpack(*word));
            }
            clic.rebuild();
        }
        hart.refresh_interrupts(host);
    }
    Ok(())
}
