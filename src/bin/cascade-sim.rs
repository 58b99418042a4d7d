use cascade::{consensus::params::Params, sim::Simulator};
use clap::{arg, command, ArgMatches};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parse CLI args
fn parse_cli_args() -> ArgMatches {
    command!()
        .about("Run an in-process consensus simulation")
        .arg(
            arg!(--nodes <COUNT> "Number of nodes in the simulated network")
                .required(false)
                .default_value("3")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--vertices <COUNT> "Number of vertices to propose")
                .required(false)
                .default_value("30")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--maxparents <COUNT> "Maximum parents per generated vertex")
                .required(false)
                .default_value("2")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--seconds <SECS> "How long to let consensus run after seeding")
                .required(false)
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            arg!(--loglevel <LEVEL> "Set log level")
                .required(false)
                .default_value("info")
                .value_parser(["info", "debug", "trace"]),
        )
        .get_matches()
}

#[tokio::main]
async fn main() {
    let args = parse_cli_args();
    let loglevel: &String = args.get_one("loglevel").expect("loglevel has a default");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(loglevel))
        .init();

    let nodes: usize = *args.get_one("nodes").expect("nodes has a default");
    let vertices: usize = *args.get_one("vertices").expect("vertices has a default");
    let max_parents: usize = *args.get_one("maxparents").expect("maxparents has a default");
    let seconds: u64 = *args.get_one("seconds").expect("seconds has a default");

    let mut sim = Simulator::new(Params::default());
    for i in 0..nodes {
        sim.add_node(&format!("node-{i}"))
            .expect("node ids are unique");
    }
    sim.connect_all();
    sim.start_all().expect("nodes start exactly once");

    info!("seeding {vertices} vertices through node-0");
    let accepted = sim
        .seed_random_vertices("node-0", vertices, max_parents)
        .await;
    info!("{} vertices accepted locally", accepted.len());

    info!("running consensus for {seconds}s");
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    sim.stop_all().await;

    for (node, finalized) in sim.finalized_counts() {
        info!("{node} finalized {finalized} vertices");
    }
}
