//! Net merging across shorts and hierarchy boundaries.

use arcstr::ArcStr;
use schir::InstancePath;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct NetKey(u32);

type NetUf = ena::unify::InPlaceUnificationTable<NetKey>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) enum NetPriority {
    Ground = 0,
    Default = 1,
}

/// The value associated to a net in the union find data structure.
///
/// The smallest value in a merged set names the set: ground first, then
/// the shallowest net, then the net allocated first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct NetRank {
    priority: NetPriority,
    depth: usize,
    slot: u32,
}

impl ena::unify::UnifyKey for NetKey {
    type Value = NetRank;
    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        Self(u)
    }

    fn tag() -> &'static str {
        "NetKey"
    }
}

impl ena::unify::UnifyValue for NetRank {
    type Error = ena::unify::NoError;

    fn unify_values(value1: &Self, value2: &Self) -> std::result::Result<Self, Self::Error> {
        Ok(std::cmp::min(*value1, *value2))
    }
}

/// Where a net was declared.
#[derive(Clone, Debug)]
pub(crate) struct NetSlot {
    pub(crate) path: InstancePath,
    pub(crate) level: ArcStr,
    pub(crate) local: ArcStr,
}

impl NetSlot {
    /// The schematic-level name of the net, qualified by its instance path.
    pub(crate) fn qualified(&self) -> ArcStr {
        self.path.qualify(&self.local)
    }
}

/// Every net seen during flattening, with the equivalence classes formed by
/// shorts and port connections.
pub(crate) struct NetArena {
    uf: NetUf,
    slots: Vec<NetSlot>,
    ground: Option<NetKey>,
}

impl NetArena {
    pub(crate) fn new() -> Self {
        Self {
            uf: NetUf::new(),
            slots: Vec::new(),
            ground: None,
        }
    }

    fn push(&mut self, priority: NetPriority, slot: NetSlot) -> NetKey {
        let rank = NetRank {
            priority,
            depth: slot.path.depth(),
            slot: self.slots.len() as u32,
        };
        self.slots.push(slot);
        self.uf.new_key(rank)
    }

    /// Registers a net declared at some level of the hierarchy.
    pub(crate) fn declare(&mut self, path: &InstancePath, level: &ArcStr, local: &ArcStr) -> NetKey {
        self.push(
            NetPriority::Default,
            NetSlot {
                path: path.clone(),
                level: level.clone(),
                local: local.clone(),
            },
        )
    }

    /// Merges the given net into the global ground net.
    ///
    /// The ground net is created on first use and belongs to the top level.
    pub(crate) fn ground(&mut self, top: &ArcStr, key: NetKey) {
        let ground = match self.ground {
            Some(ground) => ground,
            None => {
                let ground = self.push(
                    NetPriority::Ground,
                    NetSlot {
                        path: InstancePath::top(),
                        level: top.clone(),
                        local: arcstr::literal!("0"),
                    },
                );
                self.ground = Some(ground);
                ground
            }
        };
        self.uf.union(ground, key);
    }

    /// Asserts that two nets are the same conductor.
    pub(crate) fn short(&mut self, a: NetKey, b: NetKey) {
        self.uf.union(a, b);
    }

    /// The number of registered nets.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, index: usize) -> &NetSlot {
        &self.slots[index]
    }

    /// The index of the slot that names the set containing `key`.
    pub(crate) fn representative(&mut self, key: NetKey) -> usize {
        self.uf.probe_value(key).slot as usize
    }

    /// The key registered for a slot index.
    pub(crate) fn key(index: usize) -> NetKey {
        NetKey(index as u32)
    }

    /// Whether `key` has been merged into ground.
    pub(crate) fn is_ground(&mut self, key: NetKey) -> bool {
        match self.ground {
            Some(ground) => self.uf.unioned(ground, key),
            None => false,
        }
    }
}
