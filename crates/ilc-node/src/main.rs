use clap::Parser;
use ilc_node::cli::{Cli, Command};
use ilc_node::{config, Node};
use log::error;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let node_config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {}", err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Run => {
            let node = match Node::bootstrap(node_config) {
                Ok(node) => node,
                Err(err) => {
                    eprintln!("failed to bootstrap node: {}", err);
                    std::process::exit(1);
                }
            };
            if let Err(err) = node.run().await {
                error!("node exited with error: {}", err);
                std::process::exit(1);
            }
        }
        Command::Accounts => print_accounts(&node_config),
        Command::Routes => print_routes(&node_config),
    }
}

fn print_accounts(config: &ilc_node::NodeConfig) {
    if config.peers.is_empty() {
        println!("no peer accounts configured");
        return;
    }
    for peer in &config.peers {
        println!(
            "{}\turl={}\tilp_prefix={}\tcapabilities={}",
            peer.id,
            peer.url,
            peer.ilp_prefix.as_deref().unwrap_or("-"),
            if peer.capabilities.is_empty() {
                "-".to_string()
            } else {
                peer.capabilities.join(",")
            }
        );
    }
}

fn print_routes(config: &ilc_node::NodeConfig) {
    if config.routes.is_empty() {
        println!("no static routes configured");
        return;
    }
    for route in &config.routes {
        println!("{}\tnext_hop={}\tpriority={}", route.prefix, route.next_hop, route.priority);
    }
}
