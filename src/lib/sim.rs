use rand::distributions::{Distribution};
use rand_distr::Exp;
use rand_distr::{Gamma, LogNormal};

use rand_xoshiro::Xoshiro256PlusPlus;

use std::collections::{BTreeSet, BTreeMap};
use std::f64::INFINITY;

use serde::{Serialize, Deserialize};

use crate::contacts::{ContactIndex, ContactInterval, NodeId};
use crate::errors::Error;
use crate::params::Parameters;

pub const SECONDS_PER_HOUR: i64 = 60 * 60;
pub const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// A scheduled infection commit. Ordering is by time, then node id, so
/// equal scheduled times dequeue in a deterministic order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Event {
    t: i64,
    node: NodeId,
}

/// The best transmission candidate so far for a not-yet-infected node.
#[derive(Debug, Copy, Clone)]
struct PendingInfection {
    t: i64,
    source: Option<NodeId>,
}

/// One committed infection. `source` is `None` only for the seed.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionRecord {
    pub node: NodeId,
    pub time: i64,
    pub source: Option<NodeId>,
}

/// One run of the event-driven transmission simulation over a temporal
/// contact network.
///
/// The run exclusively owns all mutable state: the susceptible set, the
/// pending-infection schedule, the output tree, the clock, and the random
/// stream. `ContactIndex` and `Parameters` are read-only, so independent
/// replicate runs can execute in parallel as long as each owns its own
/// generator.
pub struct Simulation<'a> {
    contacts: &'a ContactIndex,
    params: &'a Parameters,
    latent_mu: f64,
    latent_sigma: f64,
    susceptible: BTreeSet<NodeId>,
    asymptomatic: BTreeSet<NodeId>,
    event_queue: BTreeSet<Event>,
    pending: BTreeMap<NodeId, PendingInfection>,
    tree: Vec<InfectionRecord>,
    pub t: i64,
    rng: Xoshiro256PlusPlus,
}

impl<'a> Simulation<'a> {
    pub fn new(
        contacts: &'a ContactIndex,
        params: &'a Parameters,
        rng: Xoshiro256PlusPlus,
    ) -> Result<Self, Error> {
        params.validate()?;
        let (latent_mu, latent_sigma) = params.latent_lognormal();

        Ok(Self {
            contacts,
            params,
            latent_mu,
            latent_sigma,
            susceptible: BTreeSet::new(),
            asymptomatic: BTreeSet::new(),
            event_queue: BTreeSet::new(),
            pending: BTreeMap::new(),
            tree: Vec::new(),
            t: 0,
            rng,
        })
    }

    /// Run the outbreak seeded at `seed`, which becomes infectious at
    /// `start_time`. Consumes the run and returns the infection tree in
    /// commit order.
    pub fn run(mut self, seed: NodeId, start_time: i64) -> Result<Vec<InfectionRecord>, Error> {
        if !self.contacts.contains(seed) {
            return Err(Error::UnknownSeed(seed));
        }

        self.susceptible = self.contacts.nodes().collect();
        self.draw_asymptomatic_nodes();

        self.t = start_time;
        self.pending.insert(seed, PendingInfection { t: start_time, source: None });
        self.event_queue.insert(Event { t: start_time, node: seed });

        while let Some(event) = self.dequeue_next_event() {
            let record = self.commit_infection(event);

            // The seed is already infectious when the run starts
            let latent = match record.source {
                None => 0,
                Some(_) => self.draw_latent_period(),
            };
            let infectious = self.draw_infectious_period(record.node);

            let window_start = record.time + latent;
            self.expose_contacts(record.node, window_start, window_start + infectious);
        }

        Ok(self.tree)
    }

    /// Commit a pending infection: the node leaves the susceptible set, the
    /// clock advances to the event time, and the record joins the tree.
    fn commit_infection(&mut self, event: Event) -> InfectionRecord {
        let pending = self.pending.remove(&event.node).unwrap();
        self.susceptible.remove(&event.node);
        self.t = event.t;

        let record = InfectionRecord {
            node: event.node,
            time: event.t,
            source: pending.source,
        };
        self.tree.push(record);
        record
    }

    /// Schedule transmissions from `node` across every contact interval
    /// overlapping its infectious window `[window_start, window_end)`.
    fn expose_contacts(&mut self, node: NodeId, window_start: i64, window_end: i64) {
        let contact_list: Vec<ContactInterval> = match self.contacts.get(node) {
            Some(intervals) => intervals
                .iter()
                .filter(|c| c.overlaps(window_start, window_end))
                .copied()
                .collect(),
            None => return,
        };

        for contact in contact_list.iter().rev() {
            let exposure_start = window_start.max(contact.start);
            let exposure_end = window_end.min(contact.end);

            // Compare in f64: the waiting time is unbounded when beta is 0
            let delay = self.draw_transmission_delay().floor();
            if (exposure_start as f64) + delay >= (exposure_end as f64) {
                continue;
            }

            let t_infection = exposure_start + delay as i64;
            if self.susceptible.contains(&contact.partner) {
                self.schedule_infection(contact.partner, t_infection, node);
            }
        }
    }

    /// Earliest-wins upsert of the pending infection for `target`: a
    /// candidate strictly earlier than the current schedule replaces it,
    /// time and source both; a later candidate is discarded.
    fn schedule_infection(&mut self, target: NodeId, t: i64, source: NodeId) {
        if let Some(existing) = self.pending.get(&target) {
            if t >= existing.t {
                return;
            }
            self.event_queue.remove(&Event { t: existing.t, node: target });
        }
        self.pending.insert(target, PendingInfection { t, source: Some(source) });
        self.event_queue.insert(Event { t, node: target });
    }

    /// Mark `floor(N * asymptomatic_proportion)` nodes asymptomatic for the
    /// whole run, drawn uniformly without replacement. Drawn once, up front.
    fn draw_asymptomatic_nodes(&mut self) {
        let nodes: Vec<NodeId> = self.contacts.nodes().collect();
        let n_asymptomatic =
            (nodes.len() as f64 * self.params.asymptomatic_proportion) as usize;
        self.asymptomatic = rand::seq::index::sample(&mut self.rng, nodes.len(), n_asymptomatic)
            .iter()
            .map(|i| nodes[i])
            .collect();
    }

    /// Delay in seconds between infection and becoming infectious.
    fn draw_latent_period(&mut self) -> i64 {
        let lognormal = LogNormal::new(self.latent_mu, self.latent_sigma).unwrap();
        (SECONDS_PER_HOUR as f64 * lognormal.sample(&mut self.rng)) as i64
    }

    /// Infectious duration in seconds: fixed at one day for asymptomatic
    /// nodes, gamma-distributed otherwise.
    fn draw_infectious_period(&mut self, node: NodeId) -> i64 {
        if self.asymptomatic.contains(&node) {
            SECONDS_PER_DAY
        }
        else {
            let (shape, scale) = self.params.infectious_gamma();
            let gamma = Gamma::new(shape, scale).unwrap();
            (SECONDS_PER_HOUR as f64 * gamma.sample(&mut self.rng)) as i64
        }
    }

    /// Seconds of shared exposure until a transmission attempt succeeds,
    /// given a per-second success probability of `beta`. Infinite when
    /// `beta` is zero.
    fn draw_transmission_delay(&mut self) -> f64 {
        let rate = self.params.beta / (1.0 - self.params.beta);
        if rate == 0.0 {
            INFINITY
        }
        else {
            Exp::new(rate).unwrap().sample(&mut self.rng)
        }
    }

    fn dequeue_next_event(&mut self) -> Option<Event> {
        let event_opt = self.event_queue.iter().next().map(|event| *event);
        if let Some(event) = event_opt {
            self.event_queue.remove(&event);
        }
        event_opt
    }
}

/// Simulate one outbreak seeded at `seed` becoming infectious at
/// `start_time`, returning the transmission tree in chronological commit
/// order.
pub fn simulate(
    seed: NodeId,
    start_time: i64,
    contacts: &ContactIndex,
    params: &Parameters,
    rng: Xoshiro256PlusPlus,
) -> Result<Vec<InfectionRecord>, Error> {
    Simulation::new(contacts, params, rng)?.run(seed, start_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::rand_core::SeedableRng;

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    fn reference_params() -> Parameters {
        Parameters {
            beta: 0.001,
            l_mode: 22.0,
            l_dispersion: 1.1,
            i_mode: 2.0,
            i_shape: 5.0,
            asymptomatic_proportion: 0.0,
        }
    }

    /// Near-certain transmission on any exposure: high beta, second-scale
    /// latent delay, infectious period far longer than any test window.
    fn hot_params() -> Parameters {
        Parameters {
            beta: 0.99,
            l_mode: 0.001,
            l_dispersion: 1.01,
            i_mode: 1000.0,
            i_shape: 5.0,
            asymptomatic_proportion: 0.0,
        }
    }

    fn check_tree_invariants(tree: &Vec<InfectionRecord>) {
        // exactly one root, and it leads the sequence
        assert_eq!(tree.iter().filter(|r| r.source.is_none()).count(), 1);
        assert!(tree[0].source.is_none());

        // commit times never decrease
        for i in 1..tree.len() {
            assert!(tree[i - 1].time <= tree[i].time);
        }

        // no node appears twice
        let mut seen = BTreeSet::new();
        for record in tree {
            assert!(seen.insert(record.node));
        }

        // every source was committed before the node it infected
        for (i, record) in tree.iter().enumerate() {
            if let Some(source) = record.source {
                let source_index = tree.iter().position(|r| r.node == source).unwrap();
                assert!(source_index < i);
                assert!(tree[source_index].time <= record.time);
            }
        }
    }

    #[test]
    fn test_isolated_seed() {
        let mut contacts = ContactIndex::new();
        contacts.insert_node(1);

        let tree = simulate(1, 5, &contacts, &reference_params(), rng(0)).unwrap();
        assert_eq!(tree, vec![InfectionRecord { node: 1, time: 5, source: None }]);
    }

    #[test]
    fn test_zero_beta_infects_only_seed() {
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 1000);
        contacts.add_contact(2, 3, 0, 1000);
        contacts.add_contact(3, 4, 0, 1000);

        let mut params = reference_params();
        params.beta = 0.0;

        let tree = simulate(1, 0, &contacts, &params, rng(0)).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node, 1);
    }

    #[test]
    fn test_start_time_past_all_contacts() {
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 100);

        let tree = simulate(1, 100, &contacts, &hot_params(), rng(0)).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_unknown_seed_rejected() {
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 100);

        match simulate(99, 0, &contacts, &reference_params(), rng(0)) {
            Err(Error::UnknownSeed(node)) => assert_eq!(node, 99),
            other => panic!("expected UnknownSeed, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_params_rejected_before_run() {
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 100);

        let mut params = reference_params();
        params.i_shape = 1.0;

        match simulate(1, 0, &contacts, &params, rng(0)) {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "i_shape"),
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_chain_scenario() {
        // A contacts B during [0, 100); B contacts C during [50, 150).
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 100);
        contacts.add_contact(2, 3, 50, 150);

        let tree = simulate(1, 0, &contacts, &hot_params(), rng(7)).unwrap();
        check_tree_invariants(&tree);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree[0], InfectionRecord { node: 1, time: 0, source: None });

        let b = tree.iter().find(|r| r.node == 2).unwrap();
        assert_eq!(b.source, Some(1));
        assert!(b.time >= 0 && b.time < 100);

        let c = tree.iter().find(|r| r.node == 3).unwrap();
        assert_eq!(c.source, Some(2));
        assert!(c.time >= 50 && c.time < 150);
        assert!(c.time > b.time);
    }

    #[test]
    fn test_earliest_wins_upsert() {
        let contacts = ContactIndex::new();
        let params = reference_params();
        let mut sim = Simulation::new(&contacts, &params, rng(0)).unwrap();

        sim.schedule_infection(7, 100, 1);
        sim.schedule_infection(7, 80, 2);
        // later candidate than the current best: discarded
        sim.schedule_infection(7, 90, 3);

        assert_eq!(sim.event_queue.len(), 1);
        assert!(sim.event_queue.contains(&Event { t: 80, node: 7 }));

        let pending = sim.pending[&7];
        assert_eq!(pending.t, 80);
        assert_eq!(pending.source, Some(2));
    }

    #[test]
    fn test_earliest_wins_end_to_end() {
        // The seed infects X and Y early; both then contact Z in the same
        // window, and exactly one of them becomes Z's source.
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 10);
        contacts.add_contact(1, 3, 0, 10);
        contacts.add_contact(2, 4, 1000, 2000);
        contacts.add_contact(3, 4, 1000, 2000);

        let tree = simulate(1, 0, &contacts, &hot_params(), rng(3)).unwrap();
        check_tree_invariants(&tree);

        assert_eq!(tree.len(), 4);
        let z = tree.iter().find(|r| r.node == 4).unwrap();
        assert!(z.source == Some(2) || z.source == Some(3));
        assert!(z.time >= 1000 && z.time < 2000);
    }

    #[test]
    fn test_causality_with_nonzero_latency() {
        let mut contacts = ContactIndex::new();
        for i in 0..10 {
            // hour-long contacts spaced a day apart along a line
            contacts.add_contact(i, i + 1, i * SECONDS_PER_DAY, i * SECONDS_PER_DAY + SECONDS_PER_HOUR);
        }

        let mut params = reference_params();
        params.beta = 0.01;
        params.i_mode = 200.0;

        let tree = simulate(0, 0, &contacts, &params, rng(11)).unwrap();
        check_tree_invariants(&tree);

        // the reference latent mode is hours long, so every transmission
        // commits strictly after its source
        for record in &tree {
            if let Some(source) = record.source {
                let source_record = tree.iter().find(|r| r.node == source).unwrap();
                assert!(source_record.time < record.time);
            }
        }
    }

    #[test]
    fn test_determinism_given_fixed_stream() {
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, 0, 4000);
        contacts.add_contact(1, 3, 1000, 90000);
        contacts.add_contact(2, 4, 2000, 150000);
        contacts.add_contact(3, 4, 50000, 200000);
        contacts.add_contact(4, 5, 100000, 400000);
        contacts.add_contact(5, 6, 300000, 500000);

        let mut params = reference_params();
        params.beta = 0.01;
        params.asymptomatic_proportion = 0.3;

        let tree_a = simulate(1, 0, &contacts, &params, rng(42)).unwrap();
        let tree_b = simulate(1, 0, &contacts, &params, rng(42)).unwrap();
        assert_eq!(tree_a, tree_b);
        check_tree_invariants(&tree_a);
    }

    #[test]
    fn test_asymptomatic_draw_size() {
        let mut contacts = ContactIndex::new();
        for i in 0..5 {
            contacts.add_contact(2 * i, 2 * i + 1, 0, 100);
        }

        let mut params = reference_params();
        params.asymptomatic_proportion = 0.5;

        let mut sim = Simulation::new(&contacts, &params, rng(0)).unwrap();
        sim.draw_asymptomatic_nodes();

        assert_eq!(sim.asymptomatic.len(), 5);
        for node in &sim.asymptomatic {
            assert!(contacts.contains(*node));
        }
    }

    #[test]
    fn test_asymptomatic_period_is_one_day() {
        // With every node asymptomatic, the seed's infectious window is
        // exactly one day; a contact starting at the boundary is never
        // exposed.
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, SECONDS_PER_DAY, SECONDS_PER_DAY + 1000);

        let mut params = hot_params();
        params.asymptomatic_proportion = 1.0;

        let tree = simulate(1, 0, &contacts, &params, rng(0)).unwrap();
        assert_eq!(tree.len(), 1);

        // a contact overlapping the final second of the window is exposed
        let mut contacts = ContactIndex::new();
        contacts.add_contact(1, 2, SECONDS_PER_DAY - 1, SECONDS_PER_DAY + 1000);

        let tree = simulate(1, 0, &contacts, &params, rng(0)).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].node, 2);
        assert_eq!(tree[1].time, SECONDS_PER_DAY - 1);
    }
}
