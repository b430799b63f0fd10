use crate::model::HostStash;

/// Chooses stash hosts for a new block from the group's registered stashes.
///
/// Must be deterministic: every member answers the same suggestion request
/// and the client keeps the majority answer.
pub trait PlacementStrategy: Send + Sync {
    fn suggest(&self, stashes: Vec<HostStash>, count: usize) -> Vec<HostStash>;
}

/// Most free space first, ties broken by host id. Full hosts are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadroomPlacement;

impl PlacementStrategy for HeadroomPlacement {
    fn suggest(&self, mut stashes: Vec<HostStash>, count: usize) -> Vec<HostStash> {
        stashes.retain(|stash| stash.headroom() > 0);
        stashes.sort_by(|a, b| {
            b.headroom()
                .cmp(&a.headroom())
                .then(a.host_id.cmp(&b.host_id))
        });
        stashes.truncate(count);
        stashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stash(host_id: u64, capacity: u64, used: u64) -> HostStash {
        HostStash {
            host_id,
            capacity,
            used,
            owner: host_id,
        }
    }

    #[test]
    fn test_headroom_order() {
        let picked = HeadroomPlacement.suggest(
            vec![
                stash(1, 100, 90),
                stash(2, 100, 0),
                stash(3, 50, 50),
                stash(4, 200, 100),
                stash(5, 100, 0),
            ],
            3,
        );
        let ids: Vec<_> = picked.iter().map(|stash| stash.host_id).collect();
        assert_eq!(ids, vec![2, 4, 5]);
    }

    #[test]
    fn test_fewer_hosts_than_requested() {
        let picked = HeadroomPlacement.suggest(vec![stash(1, 10, 0), stash(2, 10, 10)], 8);
        assert_eq!(picked.len(), 1);
    }
}
