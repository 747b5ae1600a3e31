//! The authoritative per-match simulation: tick state machine, snapshot and
//! event emission.

use serde::Serialize;

use crate::model::matchrec::MatchPhase;
use crate::model::money::Cents;
use crate::physics::{self, Cell, Pellet, Vec2};
use crate::rng::RngStreams;

pub const COUNTDOWN_SECS: f64 = 10.0;
pub const ACTIVE_SECS: f64 = 4.5 * 60.0;
pub const SHRINK_SECS: f64 = 1.5 * 60.0;
pub const MAP_RADIUS_DEFAULT: f64 = 1000.0;
pub const SPAWN_DISK_FRACTION: f64 = 0.7;
pub const INITIAL_PELLETS: usize = 500;
pub const MAX_PELLETS: usize = 500;
pub const PELLET_RESPAWN_P: f64 = 0.1;
pub const SHRINK_FACTOR: f64 = 0.65;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchEvent {
    Countdown { seconds_left: u32 },
    Kill { killer: String, victim: String },
    Shrink { fog_radius: f64 },
    End,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellSnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub mass: f64,
    pub team: u32,
    pub is_dead: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PelletSnapshot {
    pub id: u64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub cells: Vec<CellSnapshot>,
    pub pellets: Vec<PelletSnapshot>,
    pub fog_radius: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Input {
    pub axes: Vec2,
    pub boost: bool,
}

pub struct Match {
    pub match_id: String,
    pub buy_in: Cents,
    pub map_radius: f64,
    pub phase: MatchPhase,
    pub tick: u64,
    pub fog_radius: f64,
    pub cells: Vec<Cell>,
    pub pellets: Vec<Pellet>,
    next_pellet_id: u64,
    rng: RngStreams,
    inputs: std::collections::HashMap<String, Input>,
    tick_hz: f64,
}

impl Match {
    pub fn new(
        match_id: String,
        buy_in: Cents,
        player_ids: &[(String, u32)],
        seed_hex: &str,
        map_radius: f64,
        tick_hz: f64,
    ) -> anyhow::Result<Self> {
        let mut rng = RngStreams::new(seed_hex)?;

        let spawn_radius = map_radius * SPAWN_DISK_FRACTION;
        let mut cells = Vec::with_capacity(player_ids.len());
        for (id, team) in player_ids {
            let (x, y) = rng.stream(RngStreams::SPAWN)?.next_point_in_disk(spawn_radius);
            cells.push(Cell {
                id: id.clone(),
                team: *team,
                pos: Vec2 { x, y },
                vel: Vec2::ZERO,
                mass: physics::BASE_MASS,
                max_mass_seen: physics::BASE_MASS,
                boost_requested: false,
                last_boost_at_ms: -physics::BOOST_COOLDOWN_MS,
                is_dead: false,
                kills: 0,
            });
        }

        let mut pellets = Vec::with_capacity(INITIAL_PELLETS);
        let mut next_pellet_id = 0u64;
        for _ in 0..INITIAL_PELLETS {
            let (x, y) = rng.stream(RngStreams::PELLETS)?.next_point_in_disk(map_radius);
            pellets.push(Pellet { id: next_pellet_id, pos: Vec2 { x, y } });
            next_pellet_id += 1;
        }

        Ok(Self {
            match_id,
            buy_in,
            map_radius,
            phase: MatchPhase::Countdown,
            tick: 0,
            fog_radius: map_radius,
            cells,
            pellets,
            next_pellet_id,
            rng,
            inputs: std::collections::HashMap::new(),
            tick_hz,
        })
    }

    pub fn apply_input(&mut self, cell_id: &str, axes: Vec2, boost: bool) {
        let axes = axes.clamp_len(1.0);
        self.inputs.insert(cell_id.to_string(), Input { axes, boost });
    }

    fn elapsed_active_secs(&self) -> f64 {
        let tick_since_active = self.tick.saturating_sub(
            (COUNTDOWN_SECS * self.tick_hz) as u64,
        );
        tick_since_active as f64 / self.tick_hz
    }

    /// Advance the match by one tick. Returns any events emitted this tick.
    pub fn tick(&mut self) -> anyhow::Result<Vec<MatchEvent>> {
        let mut events = Vec::new();
        let dt = 1.0 / self.tick_hz;
        let now_ms = (self.tick as f64 / self.tick_hz * 1000.0) as i64;

        match self.phase {
            MatchPhase::Countdown => {
                self.tick += 1;
                if self.tick as f64 >= COUNTDOWN_SECS * self.tick_hz {
                    self.phase = MatchPhase::Active;
                }
                return Ok(events);
            }
            MatchPhase::Active => {
                if self.elapsed_active_secs() >= ACTIVE_SECS {
                    self.phase = MatchPhase::Shrink;
                    events.push(MatchEvent::Shrink { fog_radius: self.fog_radius });
                }
            }
            MatchPhase::Shrink => {
                let p = ((self.elapsed_active_secs() - ACTIVE_SECS) / SHRINK_SECS).clamp(0.0, 1.0);
                self.fog_radius = self.map_radius * (1.0 - SHRINK_FACTOR * p);
                if self.elapsed_active_secs() >= ACTIVE_SECS + SHRINK_SECS {
                    self.phase = MatchPhase::Settlement;
                    events.push(MatchEvent::End);
                    return Ok(events);
                }
            }
            MatchPhase::Settlement | MatchPhase::Completed | MatchPhase::Refunding => {
                return Ok(events);
            }
        }

        let growth_cap = physics::growth_cap(self.buy_in);
        let in_shrink = matches!(self.phase, MatchPhase::Shrink);

        for cell in self.cells.iter_mut() {
            let input = self.inputs.get(&cell.id).cloned().unwrap_or_default();
            cell.boost_requested = input.boost;
            physics::advance(cell, input.axes, dt, now_ms);
            physics::clamp_to_map(cell, self.map_radius);
            if in_shrink {
                physics::apply_fog(cell, self.fog_radius, dt);
            }
        }

        // Collisions must be evaluated in ordered pairs by cell id ascending,
        // not vector/join order, so cascading eats are reproducible across
        // implementations given the same match membership.
        let mut order: Vec<usize> = (0..self.cells.len()).collect();
        order.sort_by(|&a, &b| self.cells[a].id.cmp(&self.cells[b].id));
        for oi in 0..order.len() {
            for oj in (oi + 1)..order.len() {
                let (a, b) = two_mut(&mut self.cells, order[oi], order[oj]);
                if physics::try_eat(a, b, growth_cap) {
                    events.push(MatchEvent::Kill { killer: a.id.clone(), victim: b.id.clone() });
                } else if physics::try_eat(b, a, growth_cap) {
                    events.push(MatchEvent::Kill { killer: b.id.clone(), victim: a.id.clone() });
                }
            }
        }

        for cell in self.cells.iter_mut() {
            self.pellets.retain(|p| !physics::try_consume(cell, p.pos, growth_cap));
        }

        if self.pellets.len() < MAX_PELLETS {
            let threshold = if in_shrink { PELLET_RESPAWN_P / 2.0 } else { PELLET_RESPAWN_P };
            let roll = self.rng.stream(RngStreams::PELLETS)?.next_f64();
            if roll < threshold {
                let (x, y) = self.rng.stream(RngStreams::PELLETS)?.next_point_in_disk(self.map_radius);
                self.pellets.push(Pellet { id: self.next_pellet_id, pos: Vec2 { x, y } });
                self.next_pellet_id += 1;
            }
        }

        self.tick += 1;
        Ok(events)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            cells: self
                .cells
                .iter()
                .map(|c| CellSnapshot {
                    id: c.id.clone(),
                    x: c.pos.x,
                    y: c.pos.y,
                    radius: c.radius(),
                    mass: c.mass,
                    team: c.team,
                    is_dead: c.is_dead,
                })
                .collect(),
            pellets: self
                .pellets
                .iter()
                .map(|p| PelletSnapshot { id: p.id, x: p.pos.x, y: p.pos.y })
                .collect(),
            fog_radius: self.fog_radius,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.phase, MatchPhase::Settlement)
    }

    /// Placement vector: cells sorted by final mass descending, ties broken
    /// by player id ascending.
    pub fn placements(&self) -> Vec<(&Cell, u32)> {
        let mut ordered: Vec<&Cell> = self.cells.iter().collect();
        ordered.sort_by(|a, b| {
            b.mass
                .partial_cmp(&a.mass)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, (i + 1) as u32))
            .collect()
    }
}

/// Mutable access to two distinct, arbitrarily-ordered indices of a slice.
fn two_mut<T>(s: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b);
    if a < b {
        let (left, right) = s.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = s.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_hex() -> String {
        hex::encode([9u8; 32])
    }

    #[test]
    fn countdown_transitions_to_active() {
        let players = vec![("a".to_string(), 0u32), ("b".to_string(), 0u32)];
        let mut m = Match::new("m1".into(), 1000, &players, &seed_hex(), MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();
        for _ in 0..(COUNTDOWN_SECS * physics::TICK_HZ) as u64 {
            m.tick().unwrap();
        }
        assert!(matches!(m.phase, MatchPhase::Active));
    }

    #[test]
    fn identical_seed_yields_identical_spawns() {
        let players = vec![("a".to_string(), 0u32), ("b".to_string(), 0u32)];
        let s = seed_hex();
        let m1 = Match::new("m1".into(), 1000, &players, &s, MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();
        let m2 = Match::new("m2".into(), 1000, &players, &s, MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();
        for (a, b) in m1.cells.iter().zip(m2.cells.iter()) {
            assert_eq!(a.pos.x.to_bits(), b.pos.x.to_bits());
            assert_eq!(a.pos.y.to_bits(), b.pos.y.to_bits());
        }
        for (a, b) in m1.pellets.iter().zip(m2.pellets.iter()) {
            assert_eq!(a.pos.x.to_bits(), b.pos.x.to_bits());
        }
    }

    #[test]
    fn collision_outcomes_are_independent_of_join_order() {
        let fwd = [("a".to_string(), 0u32), ("b".to_string(), 0u32), ("c".to_string(), 0u32)];
        let rev = [("c".to_string(), 0u32), ("b".to_string(), 0u32), ("a".to_string(), 0u32)];
        let s = seed_hex();
        let mut m1 = Match::new("m1".into(), 1_000_000, &fwd, &s, MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();
        let mut m2 = Match::new("m2".into(), 1_000_000, &rev, &s, MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();

        for m in [&mut m1, &mut m2] {
            for cell in m.cells.iter_mut() {
                cell.pos = Vec2::ZERO;
                cell.mass = match cell.id.as_str() {
                    "a" => 1000.0,
                    "b" => 100.0,
                    _ => 50.0,
                };
            }
            for _ in 0..(COUNTDOWN_SECS * physics::TICK_HZ) as u64 {
                m.tick().unwrap();
            }
            m.tick().unwrap();
        }

        let mass_a1 = m1.cells.iter().find(|c| c.id == "a").unwrap().mass;
        let mass_a2 = m2.cells.iter().find(|c| c.id == "a").unwrap().mass;
        assert_eq!(mass_a1, mass_a2);
    }

    #[test]
    fn placements_order_by_mass_desc_then_id_asc() {
        let players = vec![("b".to_string(), 0u32), ("a".to_string(), 0u32)];
        let mut m = Match::new("m1".into(), 1000, &players, &seed_hex(), MAP_RADIUS_DEFAULT, physics::TICK_HZ).unwrap();
        m.cells[0].mass = 50.0;
        m.cells[1].mass = 50.0;
        let placements = m.placements();
        assert_eq!(placements[0].0.id, "a");
        assert_eq!(placements[1].0.id, "b");
    }
}
