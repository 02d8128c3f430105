use std::f64::consts::PI;

use crate::estimation::solution::{
    BusRes, LineRes, PowerFlowSolution, SolutionTables, Trafo3wRes, TrafoRes,
};
use crate::io::pandapower::{Bus, ExtGrid, Gen, Line, Load, Network, Trafo, Trafo3w};

/// Built-in study networks with matching reference solutions, so studies can
/// run against a replayed engine output without any files on disk.

fn bus(index: i64, vn_kv: f64) -> Bus {
    Bus {
        index,
        in_service: true,
        vn_kv,
        ..Default::default()
    }
}

fn load(bus: i64, p_mw: f64, q_mvar: f64) -> Load {
    Load {
        bus,
        p_mw,
        q_mvar,
        in_service: true,
        scaling: 1.0,
        ..Default::default()
    }
}

/// Converts a branch given in per-unit on the system base into ohmic line data.
fn line_from_pu(
    from_bus: i64,
    to_bus: i64,
    r_pu: f64,
    x_pu: f64,
    b_pu: f64,
    vn_kv: f64,
    f_hz: f64,
    sn_mva: f64,
) -> Line {
    let z_base = vn_kv * vn_kv / sn_mva;
    Line {
        from_bus,
        to_bus,
        in_service: true,
        length_km: 1.0,
        parallel: 1,
        r_ohm_per_km: r_pu * z_base,
        x_ohm_per_km: x_pu * z_base,
        c_nf_per_km: b_pu / z_base / (2.0 * PI * f_hz) * 1e9,
        max_i_ka: sn_mva / (3.0_f64.sqrt() * vn_kv) * 2.5,
        ..Default::default()
    }
}

/// Phase current in kA carried by a branch terminal.
fn terminal_i_ka(p_mw: f64, q_mvar: f64, vm_pu: f64, vn_kv: f64) -> f64 {
    let s_mva = (p_mw * p_mw + q_mvar * q_mvar).sqrt();
    s_mva / (3.0_f64.sqrt() * vm_pu * vn_kv)
}

/// The WSCC 9-bus system: three generators feeding three loads over a 345 kV
/// ring, the standard transmission benchmark.
pub fn case9() -> Network {
    let vn = 345.0;
    let f = 60.0;
    let sn = 100.0;

    let mut net = Network {
        f_hz: f,
        sn_mva: sn,
        ..Default::default()
    };
    net.bus = (0..9).map(|i| bus(i, vn)).collect();
    net.ext_grid = Some(vec![ExtGrid {
        bus: 0,
        vm_pu: 1.0,
        va_degree: 0.0,
        in_service: true,
        ..Default::default()
    }]);
    net.gen = Some(vec![
        Gen {
            bus: 1,
            p_mw: 163.0,
            vm_pu: 1.025,
            in_service: true,
            scaling: 1.0,
            ..Default::default()
        },
        Gen {
            bus: 2,
            p_mw: 85.0,
            vm_pu: 1.025,
            in_service: true,
            scaling: 1.0,
            ..Default::default()
        },
    ]);
    net.load = Some(vec![
        load(4, 90.0, 30.0),
        load(6, 100.0, 35.0),
        load(8, 125.0, 50.0),
    ]);
    // branch data in per unit on the 100 MVA / 345 kV base
    let branches = [
        (0, 3, 0.0, 0.0576, 0.0),
        (3, 4, 0.017, 0.092, 0.158),
        (4, 5, 0.039, 0.17, 0.358),
        (2, 5, 0.0, 0.0586, 0.0),
        (5, 6, 0.0119, 0.1008, 0.209),
        (6, 7, 0.0085, 0.072, 0.149),
        (7, 1, 0.0, 0.0625, 0.0),
        (7, 8, 0.032, 0.161, 0.306),
        (8, 3, 0.01, 0.085, 0.176),
    ];
    net.line = Some(
        branches
            .iter()
            .map(|&(fb, tb, r, x, b)| line_from_pu(fb, tb, r, x, b, vn, f, sn))
            .collect(),
    );
    net
}

/// Reference power-flow solution for [`case9`], as a solved engine would
/// report it. Injections use the generation-positive sign convention.
pub fn case9_solution() -> PowerFlowSolution {
    let vn = 345.0;
    let vm = [
        1.0, 1.025, 1.025, 0.9870, 0.9755, 1.0034, 0.9856, 0.9962, 0.9576,
    ];
    let va = [0.0, 9.28, 4.66, -2.22, -3.99, 1.93, 0.62, 3.80, -3.99];
    let p = [71.95, 163.0, 85.0, 0.0, -90.0, 0.0, -100.0, 0.0, -125.0];
    let q = [24.07, 14.46, -3.65, 0.0, -30.0, 0.0, -35.0, 0.0, -50.0];

    let bus = (0..9)
        .map(|i| BusRes {
            vm_pu: vm[i],
            va_degree: va[i],
            p_mw: p[i],
            q_mvar: q[i],
        })
        .collect();

    // (from bus, to bus, p_from, q_from, p_to, q_to)
    let flows = [
        (0, 3, 71.95, 24.07, -71.95, -20.75),
        (3, 4, 30.73, 1.48, -30.54, -16.54),
        (4, 5, -59.46, -13.46, 60.82, -18.07),
        (2, 5, 85.0, -3.65, -85.0, 7.89),
        (5, 6, 24.18, 3.12, -24.10, -24.30),
        (6, 7, -75.90, -10.70, 76.38, -0.80),
        (7, 1, -163.0, 9.18, 163.0, 14.46),
        (7, 8, 86.62, -8.38, -84.04, -11.31),
        (8, 3, -40.96, -38.69, 41.23, 21.34),
    ];
    let line = flows
        .iter()
        .map(|&(fb, tb, pf, qf, pt, qt): &(usize, usize, _, _, _, _)| LineRes {
            p_from_mw: pf,
            q_from_mvar: qf,
            p_to_mw: pt,
            q_to_mvar: qt,
            i_from_ka: terminal_i_ka(pf, qf, vm[fb], vn),
            i_to_ka: terminal_i_ka(pt, qt, vm[tb], vn),
        })
        .collect();

    PowerFlowSolution {
        tables: SolutionTables {
            bus,
            line,
            ..Default::default()
        },
        converged: true,
        iterations: 4,
    }
}

/// A small medium-voltage feeder with a three-winding transformer: a 110 kV
/// infeed split onto 20 kV and 10 kV windings, a 20 kV cable to a secondary
/// station and a distribution transformer down to 0.4 kV.
pub fn mv_trafo3w() -> Network {
    let f = 50.0;
    let mut net = Network {
        f_hz: f,
        sn_mva: 100.0,
        ..Default::default()
    };
    net.bus = vec![
        bus(0, 110.0),
        bus(1, 20.0),
        bus(2, 10.0),
        bus(3, 20.0),
        bus(4, 0.4),
    ];
    net.ext_grid = Some(vec![ExtGrid {
        bus: 0,
        vm_pu: 1.0,
        va_degree: 0.0,
        in_service: true,
        ..Default::default()
    }]);
    net.trafo3w = Some(vec![Trafo3w {
        hv_bus: 0,
        mv_bus: 1,
        lv_bus: 2,
        in_service: true,
        vn_hv_kv: 110.0,
        vn_mv_kv: 20.0,
        vn_lv_kv: 10.0,
        sn_hv_mva: 63.0,
        sn_mv_mva: 25.0,
        sn_lv_mva: 38.0,
        vk_hv_percent: 10.4,
        vk_mv_percent: 10.4,
        vk_lv_percent: 10.4,
        vkr_hv_percent: 0.28,
        vkr_mv_percent: 0.32,
        vkr_lv_percent: 0.35,
        pfe_kw: 35.0,
        i0_percent: 0.89,
        ..Default::default()
    }]);
    net.line = Some(vec![Line {
        from_bus: 1,
        to_bus: 3,
        in_service: true,
        length_km: 2.5,
        parallel: 1,
        r_ohm_per_km: 0.161,
        x_ohm_per_km: 0.117,
        c_nf_per_km: 273.0,
        max_i_ka: 0.362,
        ..Default::default()
    }]);
    net.trafo = Some(vec![Trafo {
        hv_bus: 3,
        lv_bus: 4,
        in_service: true,
        sn_mva: 0.4,
        vn_hv_kv: 20.0,
        vn_lv_kv: 0.4,
        vk_percent: 6.0,
        vkr_percent: 1.425,
        pfe_kw: 1.35,
        i0_percent: 0.3375,
        parallel: 1,
        ..Default::default()
    }]);
    net.load = Some(vec![
        load(2, 1.0, 0.3),
        load(3, 0.8, 0.2),
        load(4, 0.1, 0.05),
    ]);
    net
}

/// Reference power-flow solution for [`mv_trafo3w`].
pub fn mv_trafo3w_solution() -> PowerFlowSolution {
    let vm = [1.0, 0.9952, 0.9923, 0.9941, 0.9852];
    let va = [0.0, -0.42, -0.51, -0.47, -1.22];
    let p = [1.925, 0.0, -1.0, -0.8, -0.1];
    let q = [0.612, 0.0, -0.3, -0.2, -0.05];
    let vn = [110.0, 20.0, 10.0, 20.0, 0.4];

    let bus = (0..5)
        .map(|i| BusRes {
            vm_pu: vm[i],
            va_degree: va[i],
            p_mw: p[i],
            q_mvar: q[i],
        })
        .collect();

    let (lp_f, lq_f, lp_t, lq_t) = (0.9042, 0.2541, -0.9014, -0.2512);
    let line = vec![LineRes {
        p_from_mw: lp_f,
        q_from_mvar: lq_f,
        p_to_mw: lp_t,
        q_to_mvar: lq_t,
        i_from_ka: terminal_i_ka(lp_f, lq_f, vm[1], vn[1]),
        i_to_ka: terminal_i_ka(lp_t, lq_t, vm[3], vn[3]),
    }];

    let (tp_h, tq_h, tp_l, tq_l) = (0.1014, 0.0512, -0.1, -0.05);
    let trafo = vec![TrafoRes {
        p_hv_mw: tp_h,
        q_hv_mvar: tq_h,
        p_lv_mw: tp_l,
        q_lv_mvar: tq_l,
        i_hv_ka: terminal_i_ka(tp_h, tq_h, vm[3], vn[3]),
        i_lv_ka: terminal_i_ka(tp_l, tq_l, vm[4], vn[4]),
    }];

    let (wp_h, wq_h) = (1.925, 0.612);
    let (wp_m, wq_m) = (-0.9042, -0.2541);
    let (wp_l, wq_l) = (-1.0, -0.3);
    let trafo3w = vec![Trafo3wRes {
        p_hv_mw: wp_h,
        q_hv_mvar: wq_h,
        p_mv_mw: wp_m,
        q_mv_mvar: wq_m,
        p_lv_mw: wp_l,
        q_lv_mvar: wq_l,
        i_hv_ka: terminal_i_ka(wp_h, wq_h, vm[0], vn[0]),
        i_mv_ka: terminal_i_ka(wp_m, wq_m, vm[1], vn[1]),
        i_lv_ka: terminal_i_ka(wp_l, wq_l, vm[2], vn[2]),
    }];

    PowerFlowSolution {
        tables: SolutionTables {
            bus,
            line,
            trafo,
            trafo3w,
        },
        converged: true,
        iterations: 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pandapower::table_len;

    #[test]
    fn test_case9_shape() {
        let net = case9();
        assert_eq!(net.bus.len(), 9);
        assert_eq!(table_len(&net.line), 9);
        assert_eq!(table_len(&net.gen), 2);
        assert_eq!(table_len(&net.load), 3);
        assert_eq!(net.sn_mva, 100.0);
    }

    #[test]
    fn test_case9_line_conversion() {
        let net = case9();
        let lines = net.line.as_ref().unwrap();
        // x = 0.0576 pu on a 1190.25 ohm base
        assert!((lines[0].x_ohm_per_km - 68.5584).abs() < 1e-4);
        assert_eq!(lines[0].r_ohm_per_km, 0.0);
        assert_eq!(lines[0].c_nf_per_km, 0.0);
        assert!(lines[1].c_nf_per_km > 0.0);
    }

    #[test]
    fn test_case9_solution_matches_network() {
        let net = case9();
        let sol = case9_solution();
        assert!(sol.converged);
        assert_eq!(sol.tables.bus.len(), net.bus.len());
        assert_eq!(sol.tables.line.len(), table_len(&net.line));
        assert_eq!(sol.tables.bus[0].vm_pu, 1.0);
        assert_eq!(sol.tables.bus[1].vm_pu, 1.025);
        // transit buses carry no injection
        assert_eq!(sol.tables.bus[3].p_mw, 0.0);
        assert_eq!(sol.tables.bus[7].q_mvar, 0.0);
    }

    #[test]
    fn test_trafo3w_solution_matches_network() {
        let net = mv_trafo3w();
        let sol = mv_trafo3w_solution();
        assert_eq!(sol.tables.bus.len(), net.bus.len());
        assert_eq!(sol.tables.trafo.len(), 1);
        assert_eq!(sol.tables.trafo3w.len(), 1);
        let t3 = &sol.tables.trafo3w[0];
        // winding flows balance up to losses
        assert!((t3.p_hv_mw + t3.p_mv_mw + t3.p_lv_mw).abs() < 0.05);
    }
}
