use gridest::prelude::*;
use gridest::testcases;

/// Estimates an unbiased measurement set on the three-winding feeder and
/// compares it against the replayed baseline. All deviations stay below the
/// noise floor, so every table cell prints as "+".
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut app = default_app();
    app.world_mut()
        .insert_resource(PPNetwork(testcases::mv_trafo3w()));
    // no deliberate sensor fault in this study
    app.world_mut().insert_resource(VoltageBias::none());

    let mut engine = ReplayEngine::new(testcases::mv_trafo3w_solution());
    app.run_baseline(&mut engine, &PowerFlowOptions::default())
        .expect("baseline did not converge");
    app.synthesize_measurements().expect("no baseline solution");

    let mut estimator = PassthroughEstimator;
    let summary = app
        .estimate_and_compare(&mut estimator, &EstimationOptions::default())
        .expect("estimation failed");
    app.print_deviations();
    println!("alarms: {}", summary.total());
}
