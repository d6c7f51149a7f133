use treetools::contacts::{ContactIndex, NodeId};
use treetools::errors::*;
use treetools::params::Parameters;
use treetools::sim::{simulate, InfectionRecord};
use treetools::util::*;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use indoc::indoc;
use unindent::unindent;

const META_SQL: &str = "INSERT INTO Meta VALUES (?, ?);";
const INFECTIONS_SQL: &str = indoc!("
    INSERT INTO Infections VALUES (?, ?, ?);
");

#[derive(Serialize, Deserialize)]
struct Config {
    rng_seed: Option<u32>,
    output_path: Option<String>,
    write_to_stdout: Option<bool>,

    contacts_path: String,
    seed_node: Option<NodeId>,
    start_time: Option<i64>,

    parameters: Parameters,
}

fn main() -> Result<(), Error> {
    // Read JSON data from file specified in first command-line argument or from stdin
    let args: Vec<String> = std::env::args().collect();
    let json_data = if args.len() > 1 {
        read_data_from_file(&args[1])?
    }
    else {
        read_data_from_stdin()?
    };

    // Read config from JSON data; reject bad parameters before touching anything else
    let config: Config = serde_json::from_str(&json_data).map_err(|err| json_error(&err))?;
    config.parameters.validate()?;

    // If we were given a config file, use its parent as our working directory
    if args.len() > 1 {
        std::env::set_current_dir(&Path::new(&args[1]).parent().unwrap()).unwrap();
    }

    let contacts = ContactIndex::from_tsv(&read_data_from_file(&config.contacts_path)?)?;
    eprintln!("{} nodes in contact network", contacts.len());

    let rng_seed = if let Some(rng_seed) = config.rng_seed {
        rng_seed
    }
    else {
        rand::thread_rng().gen()
    };
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(rng_seed as u64);

    // Seed node from config, or drawn uniformly from the network
    let seed_node = match config.seed_node {
        Some(node) => {
            if !contacts.contains(node) {
                return Err(Error::UnknownSeed(node));
            }
            node
        },
        None => {
            let nodes: Vec<NodeId> = contacts.nodes().collect();
            nodes[rng.gen_range(0, nodes.len())]
        }
    };

    // Start time from config, or the seed's earliest known contact
    let start_time = match config.start_time {
        Some(t) => t,
        None => contacts.earliest_contact_start(seed_node).unwrap_or(0),
    };
    eprintln!("seed node {} starting at t = {}", seed_node, start_time);

    let start = Instant::now();
    let tree = simulate(seed_node, start_time, &contacts, &config.parameters, rng)?;
    eprintln!("elapsed time: {} s", start.elapsed().as_secs_f64());
    eprintln!("{} nodes infected", tree.len());

    for record in &tree {
        match record.source {
            Some(source) => {
                println!("{} infected by {} at time {}", record.node, source, record.time)
            },
            None => {
                println!("{} infected by None at time {}", record.node, record.time)
            },
        }
    }

    // Write to DB file specified in config file
    // (or use in-memory database if not specified)
    let mut db_connection = match &config.output_path {
        Some(output_path) => {
            let db_path: PathBuf = output_path.into();
            assert!(!db_path.exists());
            rusqlite::Connection::open(db_path).unwrap()
        },
        None => {
            rusqlite::Connection::open_in_memory().unwrap()
        }
    };
    write_tree(&mut db_connection, rng_seed, seed_node, start_time, &tree);

    if config.write_to_stdout.unwrap_or(false) {
        eprintln!("Writing DB to stdout in JSON format...");

        let db_json_data = db_to_json_value(&db_connection, &vec![
            ("Meta", vec!["key", "value"]),
            ("Infections", vec!["time", "infected_id", "source_id"]),
        ]);

        println!("{}", serde_json::to_string_pretty(&db_json_data).unwrap());
    }

    eprintln!("...done.");

    Ok(())
}

fn write_tree(
    db_connection: &mut rusqlite::Connection,
    rng_seed: u32, seed_node: NodeId, start_time: i64,
    tree: &Vec<InfectionRecord>,
) {
    let db_transaction = db_connection.transaction().unwrap();

    db_transaction.execute_batch(&unindent("
        CREATE TABLE Meta (key, value);
        CREATE TABLE Infections (time INTEGER, infected_id INTEGER, source_id INTEGER);
    ")).unwrap();

    {
        let mut insert_meta = db_transaction.prepare(META_SQL).unwrap();
        insert_meta.execute(rusqlite::params!["rng_seed", rng_seed]).unwrap();
        insert_meta.execute(rusqlite::params!["seed_node", seed_node]).unwrap();
        insert_meta.execute(rusqlite::params!["start_time", start_time]).unwrap();

        let mut insert_infection = db_transaction.prepare(INFECTIONS_SQL).unwrap();
        for record in tree {
            insert_infection.execute(
                rusqlite::params![record.time, record.node, record.source]
            ).unwrap();
        }
    }

    db_transaction.commit().unwrap();
}
