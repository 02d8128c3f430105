use std::collections::HashMap;

use bevy_ecs::entity::EntityHash;
use bevy_ecs::name::Name;
use bevy_ecs::prelude::*;
use derive_more::{Deref, DerefMut};

use crate::io::pandapower;

/// Wrapper around a `pandapower::Network` structure.
///
/// This resource holds the complete network description the measurement study
/// operates on; it is also what gets handed to the external analysis engine.
#[derive(Debug, Resource, Deref, DerefMut, Clone)]
pub struct PPNetwork(pub pandapower::Network);

/// Identifier of a bus, unique within a network.
#[derive(Component, Debug, Default, Clone, Eq, Ord, PartialEq, PartialOrd)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct BusID(pub i64);

/// Nominal voltage of a bus in kV.
#[derive(Component, Debug, Default, Clone, Deref, DerefMut)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct VNominal(pub f64);

/// Row index of an element within its pandapower table.
#[derive(Debug, Component, Default, Clone, Copy, Deref, DerefMut)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ElemIdx(pub usize);

/// Whether the element participates in the study; out-of-service elements are
/// neither measured nor compared.
#[derive(Debug, Component, Default, Clone, Copy, Deref, DerefMut)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct InService(pub bool);

/// Terminal buses of a two-port branch (from/to or hv/lv).
#[derive(Component, Deref, DerefMut, Default, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Port2(pub [i64; 2]);

/// Terminal buses of a three-winding transformer (hv/mv/lv).
#[derive(Component, Deref, DerefMut, Default, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Port3(pub [i64; 3]);

/// Marker component for a line element.
#[derive(Debug, Component, Default)]
pub struct ELine;

/// Marker component for a two-winding transformer element.
#[derive(Debug, Component, Default)]
pub struct ETrafo;

/// Marker component for a three-winding transformer element.
#[derive(Debug, Component, Default)]
pub struct ETrafo3w;

/// Resource holding common base values of the network.
#[derive(Debug, Resource, Clone)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct GridCommonData {
    pub f_hz: f64,  // Base frequency (Hz).
    pub sbase: f64, // Base power (MVA).
}

/// Resource that maps bus ids (i64) to ECS entities.
#[derive(Default, Debug, Resource)]
pub struct NodeLookup {
    forward: Vec<Option<Entity>>,
    reverse: HashMap<Entity, i64, EntityHash>,
}

impl NodeLookup {
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, Entity)> + '_ {
        self.forward
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|e| (i as i64, e)))
    }

    pub fn insert(&mut self, bus_id: i64, entity: Entity) {
        let idx = bus_id as usize;
        if self.forward.len() <= idx {
            self.forward.resize_with(idx + 1, || None);
        }

        if let Some(old_id) = self.reverse.insert(entity, bus_id) {
            if let Some(e) = self.forward.get_mut(old_id as usize) {
                if *e == Some(entity) {
                    *e = None;
                }
            }
        }

        self.forward[idx] = Some(entity);
    }

    pub fn remove_entity(&mut self, entity: Entity) {
        if let Some(id) = self.reverse.remove(&entity) {
            if let Some(slot) = self.forward.get_mut(id as usize) {
                if *slot == Some(entity) {
                    *slot = None;
                }
            }
        }
    }

    pub fn get_entity(&self, bus_id: i64) -> Option<Entity> {
        self.forward.get(bus_id as usize).and_then(|x| *x)
    }

    pub fn get_id(&self, entity: Entity) -> Option<i64> {
        self.reverse.get(&entity).copied()
    }

    pub fn contains_id(&self, bus_id: i64) -> bool {
        self.forward
            .get(bus_id as usize)
            .map_or(false, |e| e.is_some())
    }
}

/// Bundle describing one bus of the network.
#[derive(Bundle, Default)]
pub struct BusBundle {
    pub name: Name,
    pub bus_id: BusID,
    pub vn_kv: VNominal,
    pub in_service: InService,
}

impl From<&pandapower::Bus> for BusBundle {
    fn from(bus: &pandapower::Bus) -> Self {
        Self {
            name: Name::new(
                bus.name
                    .clone()
                    .unwrap_or_else(|| format!("bus_{}", bus.index)),
            ),
            bus_id: BusID(bus.index),
            vn_kv: VNominal(bus.vn_kv),
            in_service: InService(bus.in_service),
        }
    }
}

/// Bundle describing one line of the network.
#[derive(Bundle, Default)]
pub struct LineBundle {
    pub marker: ELine,
    pub idx: ElemIdx,
    pub port: Port2,
    pub in_service: InService,
}

impl LineBundle {
    pub fn new(idx: usize, line: &pandapower::Line) -> Self {
        Self {
            marker: ELine,
            idx: ElemIdx(idx),
            port: Port2([line.from_bus, line.to_bus]),
            in_service: InService(line.in_service),
        }
    }
}

/// Bundle describing one two-winding transformer of the network.
#[derive(Bundle, Default)]
pub struct TrafoBundle {
    pub marker: ETrafo,
    pub idx: ElemIdx,
    pub port: Port2,
    pub in_service: InService,
}

impl TrafoBundle {
    pub fn new(idx: usize, t: &pandapower::Trafo) -> Self {
        Self {
            marker: ETrafo,
            idx: ElemIdx(idx),
            port: Port2([t.hv_bus, t.lv_bus]),
            in_service: InService(t.in_service),
        }
    }
}

/// Bundle describing one three-winding transformer of the network.
#[derive(Bundle, Default)]
pub struct Trafo3wBundle {
    pub marker: ETrafo3w,
    pub idx: ElemIdx,
    pub port: Port3,
    pub in_service: InService,
}

impl Trafo3wBundle {
    pub fn new(idx: usize, t: &pandapower::Trafo3w) -> Self {
        Self {
            marker: ETrafo3w,
            idx: ElemIdx(idx),
            port: Port3([t.hv_bus, t.mv_bus, t.lv_bus]),
            in_service: InService(t.in_service),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_lookup_roundtrip() {
        let mut world = World::new();
        let e0 = world.spawn(BusID(0)).id();
        let e5 = world.spawn(BusID(5)).id();

        let mut lookup = NodeLookup::default();
        lookup.insert(0, e0);
        lookup.insert(5, e5);

        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.get_entity(5), Some(e5));
        assert_eq!(lookup.get_id(e0), Some(0));
        assert!(!lookup.contains_id(3));

        lookup.remove_entity(e5);
        assert_eq!(lookup.get_entity(5), None);
        assert_eq!(lookup.len(), 1);
    }

    #[test]
    fn test_bus_bundle_from_table_row() {
        let bus = pandapower::Bus {
            index: 7,
            in_service: true,
            vn_kv: 110.0,
            ..Default::default()
        };
        let bundle = BusBundle::from(&bus);
        assert_eq!(bundle.bus_id.0, 7);
        assert_eq!(bundle.vn_kv.0, 110.0);
        assert!(bundle.in_service.0);
    }
}
