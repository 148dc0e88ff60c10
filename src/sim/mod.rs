//! Agent batch simulation.
//!
//! Owns the collision world, the shared parameter record, and the agent
//! array. One call to [`Simulation::step`] advances every agent by `dt`:
//! a rayon pass runs the per-agent locomotion in parallel (agents only read
//! their own state plus the frozen world), then the deferred command queue
//! is flushed single-threaded and dynamic debris is stepped.

pub mod agent;
pub mod constants;
pub mod movement;
pub mod params;
pub mod physics;
pub mod steering;

use crossbeam_channel::{unbounded, Receiver, Sender};
use nalgebra::Vector3;
use rayon::prelude::*;

use agent::{AgentState, CapsuleExtent, MovementMode};
use constants::movement as consts;
use movement::impact::WorldCommand;
use movement::MoveContext;
use params::MovementParams;
use physics::CollisionWorld;

pub struct Simulation {
    world: CollisionWorld,
    params: MovementParams,
    agents: Vec<AgentState>,
    next_agent_id: u64,
    command_tx: Sender<WorldCommand>,
    command_rx: Receiver<WorldCommand>,
}

impl Simulation {
    /// Takes ownership of a built world. The parameter record is validated
    /// here once; a bad record is a fatal configuration error.
    pub fn new(mut world: CollisionWorld, params: MovementParams) -> Self {
        params.validate();
        world.refresh_queries();
        let (command_tx, command_rx) = unbounded();
        Self {
            world,
            params,
            agents: Vec::new(),
            next_agent_id: 1,
            command_tx,
            command_rx,
        }
    }

    pub fn world(&self) -> &CollisionWorld {
        &self.world
    }

    /// Mutable world access for scenario building; queries are refreshed on
    /// the next step.
    pub fn world_mut(&mut self) -> &mut CollisionWorld {
        &mut self.world
    }

    pub fn params(&self) -> &MovementParams {
        &self.params
    }

    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn agent(&self, id: u64) -> Option<&AgentState> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_mut(&mut self, id: u64) -> Option<&mut AgentState> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    /// Spawns an agent and settles it onto the floor below, if any.
    pub fn spawn_agent(&mut self, position: Vector3<f32>, capsule: CapsuleExtent) -> u64 {
        self.world.refresh_queries();
        let id = self.next_agent_id;
        self.next_agent_id += 1;
        let mut agent = AgentState::new(id, position, capsule);
        {
            let ctx = MoveContext {
                world: &self.world,
                params: &self.params,
                commands: &self.command_tx,
            };
            movement::initialize_agent(&mut agent, &ctx);
        }
        self.agents.push(agent);
        id
    }

    /// Spawns an agent mid-air in the Falling state, for drop-in placement.
    pub fn spawn_agent_falling(&mut self, position: Vector3<f32>, capsule: CapsuleExtent) -> u64 {
        self.world.refresh_queries();
        let id = self.next_agent_id;
        self.next_agent_id += 1;
        let mut agent = AgentState::new(id, position, capsule);
        agent.mode = MovementMode::Falling;
        agent.force_next_floor_check = true;
        self.agents.push(agent);
        id
    }

    /// Removes an agent. No teardown beyond dropping the base reference.
    pub fn despawn_agent(&mut self, id: u64) -> bool {
        match self.agents.iter().position(|a| a.id == id) {
            Some(index) => {
                let _ = self.agents.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Starts a jump for a walking agent. Returns false when the agent does
    /// not exist or is not on the ground.
    pub fn launch_agent(&mut self, id: u64) -> bool {
        let world = &self.world;
        let params = &self.params;
        let commands = &self.command_tx;
        let Some(agent) = self.agents.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if agent.mode != MovementMode::Walking {
            return false;
        }
        let ctx = MoveContext {
            world,
            params,
            commands,
        };
        agent.velocity.z = params.jump_z_velocity;
        agent.jump_force_time_remaining = params.jump_max_hold_time;
        movement::set_movement_mode(agent, &ctx, MovementMode::Falling);
        true
    }

    /// Advances the whole batch by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt < consts::MIN_TICK_TIME {
            return;
        }
        self.world.refresh_queries();

        {
            let world = &self.world;
            let params = &self.params;
            let commands = &self.command_tx;
            self.agents.par_iter_mut().for_each(|agent| {
                let ctx = MoveContext {
                    world,
                    params,
                    commands,
                };
                movement::update_agent(agent, &ctx, dt);
            });
        }

        self.flush_commands();
        self.world.step_dynamics(dt);
    }

    /// Applies the world mutations the parallel pass deferred.
    fn flush_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                WorldCommand::Impulse {
                    body,
                    impulse,
                    point,
                } => self.world.apply_impulse_at(body, impulse, point),
                WorldCommand::Force { body, force, point } => {
                    self.world.apply_force_at(body, force, point)
                }
            }
        }
    }
}
