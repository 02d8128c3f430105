use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bevy_ecs::prelude::*;
use derive_more::{Deref, DerefMut};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::elements::*;
use super::solution::PowerFlowSolution;

/// Synthesizes the measurement set an estimator is fed with: every electrical
/// quantity of the converged baseline becomes one measurement, with a deliberate
/// voltage bias injected at the target buses.

/// Measured physical quantity, using pandapower's single-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementKind {
    #[serde(rename = "v")]
    V,
    #[serde(rename = "p")]
    P,
    #[serde(rename = "q")]
    Q,
    #[serde(rename = "i")]
    I,
}

impl MeasurementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::V => "v",
            MeasurementKind::P => "p",
            MeasurementKind::Q => "q",
            MeasurementKind::I => "i",
        }
    }
}

/// Element class a measurement is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuredElement {
    Bus,
    Line,
    Trafo,
    Trafo3w,
}

impl MeasuredElement {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasuredElement::Bus => "bus",
            MeasuredElement::Line => "line",
            MeasuredElement::Trafo => "trafo",
            MeasuredElement::Trafo3w => "trafo3w",
        }
    }
}

/// Terminal a branch measurement refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSide {
    From,
    To,
    Hv,
    Mv,
    Lv,
}

impl MeasurementSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementSide::From => "from",
            MeasurementSide::To => "to",
            MeasurementSide::Hv => "hv",
            MeasurementSide::Mv => "mv",
            MeasurementSide::Lv => "lv",
        }
    }
}

/// One synthetic sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub element: MeasuredElement,
    /// Bus id for bus measurements, table row index for branch elements.
    pub index: i64,
    pub side: Option<MeasurementSide>,
    pub value: f64,
    pub std_dev: f64,
}

impl Measurement {
    pub fn bus(kind: MeasurementKind, bus: i64, value: f64, std_dev: f64) -> Self {
        Self {
            kind,
            element: MeasuredElement::Bus,
            index: bus,
            side: None,
            value,
            std_dev,
        }
    }

    pub fn branch(
        kind: MeasurementKind,
        element: MeasuredElement,
        index: i64,
        side: MeasurementSide,
        value: f64,
        std_dev: f64,
    ) -> Self {
        Self {
            kind,
            element,
            index,
            side: Some(side),
            value,
            std_dev,
        }
    }

    /// Stable identity of the measured channel, ignoring the value.
    fn channel_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.kind.hash(&mut h);
        self.element.hash(&mut h);
        self.index.hash(&mut h);
        self.side.hash(&mut h);
        h.finish()
    }
}

/// Flat list of all synthesized measurements, in element-table order.
#[derive(Debug, Default, Clone, Resource, Deref, DerefMut, Serialize, Deserialize)]
pub struct MeasurementPlan(pub Vec<Measurement>);

impl MeasurementPlan {
    pub fn count_kind(&self, kind: MeasurementKind) -> usize {
        self.0.iter().filter(|m| m.kind == kind).count()
    }

    pub fn count_element(&self, element: MeasuredElement) -> usize {
        self.0.iter().filter(|m| m.element == element).count()
    }

    pub fn find_bus(&self, kind: MeasurementKind, bus: i64) -> Option<&Measurement> {
        self.0
            .iter()
            .find(|m| m.element == MeasuredElement::Bus && m.kind == kind && m.index == bus)
    }
}

/// Measurements attached to one element entity.
#[derive(Debug, Default, Clone, Component, Deref, DerefMut)]
pub struct MeasurementSet(pub Vec<Measurement>);

/// Standard deviations reported with each measurement class, plus the choice
/// whether branch current sensors exist at all.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct MeasurementPolicy {
    pub v_stddev: f64,  // p.u.
    pub pq_stddev: f64, // MW / MVAr
    pub i_stddev: f64,  // kA
    pub include_currents: bool,
}

impl Default for MeasurementPolicy {
    fn default() -> Self {
        Self {
            v_stddev: 0.025,
            pq_stddev: 0.025,
            i_stddev: 0.002,
            include_currents: false,
        }
    }
}

/// Deliberate offsets added to voltage measurements of selected buses.
///
/// The default reproduces the classic study setup: +0.25 p.u. at bus 5.
/// Offsets targeting bus ids that do not exist in the network are ignored.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct VoltageBias {
    offsets: HashMap<i64, f64>,
}

impl Default for VoltageBias {
    fn default() -> Self {
        Self::single(5, 0.25)
    }
}

impl VoltageBias {
    /// No bias anywhere.
    pub fn none() -> Self {
        Self {
            offsets: HashMap::new(),
        }
    }

    /// Bias a single bus.
    pub fn single(bus: i64, dv_pu: f64) -> Self {
        let mut offsets = HashMap::new();
        offsets.insert(bus, dv_pu);
        Self { offsets }
    }

    pub fn set(&mut self, bus: i64, dv_pu: f64) {
        self.offsets.insert(bus, dv_pu);
    }

    pub fn offset(&self, bus: i64) -> f64 {
        self.offsets.get(&bus).copied().unwrap_or(0.0)
    }
}

/// Optional Gaussian perturbation of the synthesized values.
///
/// Disabled by default: the plan then carries the exact solution values and the
/// std-devs act purely as estimator weights, like the original study. When
/// enabled, each channel is perturbed by N(0, std_dev) drawn from a seeded rng,
/// so runs are reproducible and independent of synthesis order.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct NoisePolicy {
    pub enabled: bool,
    pub seed: u64,
}

impl Default for NoisePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: 0,
        }
    }
}

impl NoisePolicy {
    pub fn seeded(seed: u64) -> Self {
        Self {
            enabled: true,
            seed,
        }
    }

    /// Perturbs one measurement in place; a no-op when disabled.
    pub fn perturb(&self, m: &mut Measurement) {
        if !self.enabled || m.std_dev <= 0.0 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(self.seed ^ m.channel_hash());
        // std_dev of 0 was handled above, so the distribution is well formed
        if let Ok(normal) = Normal::new(0.0, m.std_dev) {
            m.value += normal.sample(&mut rng);
        }
    }
}

/// Synthesizes bus measurements from the baseline: voltage always (plus bias),
/// P and Q only for buses with nonzero injection.
pub fn synthesize_bus_measurements(
    mut cmd: Commands,
    net: Res<PPNetwork>,
    sol: Res<PowerFlowSolution>,
    policy: Res<MeasurementPolicy>,
    bias: Res<VoltageBias>,
    lookup: Res<NodeLookup>,
    mut plan: ResMut<MeasurementPlan>,
) {
    for (bus, res) in net.bus.iter().zip(sol.tables.bus.iter()) {
        if !bus.in_service {
            continue;
        }
        let mut set = Vec::with_capacity(3);
        let vm = res.vm_pu + bias.offset(bus.index);
        set.push(Measurement::bus(
            MeasurementKind::V,
            bus.index,
            vm,
            policy.v_stddev,
        ));
        if res.p_mw != 0.0 {
            set.push(Measurement::bus(
                MeasurementKind::P,
                bus.index,
                res.p_mw,
                policy.pq_stddev,
            ));
        }
        if res.q_mvar != 0.0 {
            set.push(Measurement::bus(
                MeasurementKind::Q,
                bus.index,
                res.q_mvar,
                policy.pq_stddev,
            ));
        }
        plan.extend(set.iter().cloned());
        if let Some(entity) = lookup.get_entity(bus.index) {
            cmd.entity(entity).insert(MeasurementSet(set));
        }
    }
}

fn push_branch_pq(
    set: &mut Vec<Measurement>,
    element: MeasuredElement,
    idx: i64,
    side: MeasurementSide,
    p_mw: f64,
    q_mvar: f64,
    pq_stddev: f64,
) {
    set.push(Measurement::branch(
        MeasurementKind::P,
        element,
        idx,
        side,
        p_mw,
        pq_stddev,
    ));
    set.push(Measurement::branch(
        MeasurementKind::Q,
        element,
        idx,
        side,
        q_mvar,
        pq_stddev,
    ));
}

fn push_branch_i(
    set: &mut Vec<Measurement>,
    element: MeasuredElement,
    idx: i64,
    side: MeasurementSide,
    i_ka: f64,
    i_stddev: f64,
) {
    set.push(Measurement::branch(
        MeasurementKind::I,
        element,
        idx,
        side,
        i_ka,
        i_stddev,
    ));
}

/// Synthesizes line measurements: P and Q at both terminals, currents only
/// when the policy includes current sensors.
pub fn synthesize_line_measurements(
    mut cmd: Commands,
    sol: Res<PowerFlowSolution>,
    policy: Res<MeasurementPolicy>,
    mut plan: ResMut<MeasurementPlan>,
    lines: Query<(Entity, &ElemIdx, &InService), With<ELine>>,
) {
    let by_idx: HashMap<usize, (Entity, bool)> = lines
        .iter()
        .map(|(e, idx, svc)| (idx.0, (e, svc.0)))
        .collect();

    for (idx, res) in sol.tables.line.iter().enumerate() {
        let Some(&(entity, in_service)) = by_idx.get(&idx) else {
            continue;
        };
        if !in_service {
            continue;
        }
        let mut set = Vec::with_capacity(6);
        let elem = MeasuredElement::Line;
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::From,
            res.p_from_mw,
            res.q_from_mvar,
            policy.pq_stddev,
        );
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::To,
            res.p_to_mw,
            res.q_to_mvar,
            policy.pq_stddev,
        );
        if policy.include_currents {
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::From,
                res.i_from_ka,
                policy.i_stddev,
            );
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::To,
                res.i_to_ka,
                policy.i_stddev,
            );
        }
        plan.extend(set.iter().cloned());
        cmd.entity(entity).insert(MeasurementSet(set));
    }
}

/// Synthesizes two-winding transformer measurements at the hv and lv sides.
pub fn synthesize_trafo_measurements(
    mut cmd: Commands,
    sol: Res<PowerFlowSolution>,
    policy: Res<MeasurementPolicy>,
    mut plan: ResMut<MeasurementPlan>,
    trafos: Query<(Entity, &ElemIdx, &InService), With<ETrafo>>,
) {
    let by_idx: HashMap<usize, (Entity, bool)> = trafos
        .iter()
        .map(|(e, idx, svc)| (idx.0, (e, svc.0)))
        .collect();

    for (idx, res) in sol.tables.trafo.iter().enumerate() {
        let Some(&(entity, in_service)) = by_idx.get(&idx) else {
            continue;
        };
        if !in_service {
            continue;
        }
        let mut set = Vec::with_capacity(6);
        let elem = MeasuredElement::Trafo;
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::Hv,
            res.p_hv_mw,
            res.q_hv_mvar,
            policy.pq_stddev,
        );
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::Lv,
            res.p_lv_mw,
            res.q_lv_mvar,
            policy.pq_stddev,
        );
        if policy.include_currents {
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::Hv,
                res.i_hv_ka,
                policy.i_stddev,
            );
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::Lv,
                res.i_lv_ka,
                policy.i_stddev,
            );
        }
        plan.extend(set.iter().cloned());
        cmd.entity(entity).insert(MeasurementSet(set));
    }
}

/// Synthesizes three-winding transformer measurements at all three windings.
pub fn synthesize_trafo3w_measurements(
    mut cmd: Commands,
    sol: Res<PowerFlowSolution>,
    policy: Res<MeasurementPolicy>,
    mut plan: ResMut<MeasurementPlan>,
    trafos: Query<(Entity, &ElemIdx, &InService), With<ETrafo3w>>,
) {
    let by_idx: HashMap<usize, (Entity, bool)> = trafos
        .iter()
        .map(|(e, idx, svc)| (idx.0, (e, svc.0)))
        .collect();

    for (idx, res) in sol.tables.trafo3w.iter().enumerate() {
        let Some(&(entity, in_service)) = by_idx.get(&idx) else {
            continue;
        };
        if !in_service {
            continue;
        }
        let mut set = Vec::with_capacity(9);
        let elem = MeasuredElement::Trafo3w;
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::Hv,
            res.p_hv_mw,
            res.q_hv_mvar,
            policy.pq_stddev,
        );
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::Mv,
            res.p_mv_mw,
            res.q_mv_mvar,
            policy.pq_stddev,
        );
        push_branch_pq(
            &mut set,
            elem,
            idx as i64,
            MeasurementSide::Lv,
            res.p_lv_mw,
            res.q_lv_mvar,
            policy.pq_stddev,
        );
        if policy.include_currents {
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::Hv,
                res.i_hv_ka,
                policy.i_stddev,
            );
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::Mv,
                res.i_mv_ka,
                policy.i_stddev,
            );
            push_branch_i(
                &mut set,
                elem,
                idx as i64,
                MeasurementSide::Lv,
                res.i_lv_ka,
                policy.i_stddev,
            );
        }
        plan.extend(set.iter().cloned());
        cmd.entity(entity).insert(MeasurementSet(set));
    }
}

/// Applies the noise policy to the plan and to the per-entity measurement sets.
///
/// Both views receive the same perturbation because the noise is a pure
/// function of (seed, channel identity).
pub fn apply_measurement_noise(
    noise: Res<NoisePolicy>,
    mut plan: ResMut<MeasurementPlan>,
    mut sets: Query<&mut MeasurementSet>,
) {
    if !noise.enabled {
        return;
    }
    for m in plan.iter_mut() {
        noise.perturb(m);
    }
    for mut set in sets.iter_mut() {
        for m in set.iter_mut() {
            noise.perturb(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_offset_lookup() {
        let bias = VoltageBias::default();
        assert_eq!(bias.offset(5), 0.25);
        assert_eq!(bias.offset(4), 0.0);

        let mut bias = VoltageBias::none();
        assert_eq!(bias.offset(5), 0.0);
        bias.set(2, -0.1);
        assert_eq!(bias.offset(2), -0.1);
    }

    #[test]
    fn test_policy_defaults_match_study() {
        let policy = MeasurementPolicy::default();
        assert_eq!(policy.v_stddev, 0.025);
        assert_eq!(policy.pq_stddev, 0.025);
        assert_eq!(policy.i_stddev, 0.002);
        assert!(!policy.include_currents);
    }

    #[test]
    fn test_noise_is_deterministic_per_channel() {
        let noise = NoisePolicy::seeded(42);
        let mut a = Measurement::bus(MeasurementKind::V, 3, 1.0, 0.025);
        let mut b = a.clone();
        noise.perturb(&mut a);
        noise.perturb(&mut b);
        assert_eq!(a.value, b.value);
        assert_ne!(a.value, 1.0);

        // a different channel draws a different sample
        let mut c = Measurement::bus(MeasurementKind::V, 4, 1.0, 0.025);
        noise.perturb(&mut c);
        assert_ne!(a.value, c.value);
    }

    #[test]
    fn test_noise_disabled_keeps_values() {
        let noise = NoisePolicy::default();
        let mut m = Measurement::bus(MeasurementKind::P, 0, 71.95, 0.025);
        noise.perturb(&mut m);
        assert_eq!(m.value, 71.95);
    }

    #[test]
    fn test_plan_queries() {
        let mut plan = MeasurementPlan::default();
        plan.push(Measurement::bus(MeasurementKind::V, 0, 1.0, 0.025));
        plan.push(Measurement::branch(
            MeasurementKind::P,
            MeasuredElement::Line,
            0,
            MeasurementSide::From,
            71.95,
            0.025,
        ));
        assert_eq!(plan.count_kind(MeasurementKind::V), 1);
        assert_eq!(plan.count_element(MeasuredElement::Line), 1);
        assert!(plan.find_bus(MeasurementKind::V, 0).is_some());
        assert!(plan.find_bus(MeasurementKind::Q, 0).is_none());
    }
}
