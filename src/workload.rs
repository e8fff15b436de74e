//! Reference mutator programs
//!
//! Workloads drive a [`VM`] the way a real program would: allocating,
//! linking and dropping objects while collections happen underneath. Every
//! workload verifies what it reads back, so a strategy that reclaims a live
//! cell shows up as a failed outcome rather than silent corruption.

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::runtime::gc::{AllocatorKind, GCConfig, GCStats};
use crate::runtime::memory::{Handle, Word, NULL};
use crate::vm::{user_method, FrameEnvironment, UserMethod, VMConfig, VMError, VMResult, VM};

/// Slot holding an object's primitive tag
const TAG_SLOT: usize = 0;
/// Slot holding the next link of a list cell
const LINK_SLOT: usize = 1;

/// Workload configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Mutator threads
    pub threads: usize,
    /// Iterations per thread
    pub iterations: usize,
    /// Cells per list (list churn) or live objects per thread (random graph)
    pub list_length: usize,
    /// Seed for the random graph; thread `i` uses `seed + i`
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 100,
            list_length: 8,
            seed: 42,
        }
    }
}

/// Build a linked list of fixed length in the callee frame and return its
/// head. The first argument is the (negative) tag of the tail cell.
#[derive(Debug, Clone, Copy)]
pub struct BuildList {
    pub length: usize,
}

impl UserMethod for BuildList {
    fn invoke(
        &self,
        env: &FrameEnvironment,
        args: &[Word],
    ) -> VMResult<Word> {
        let base = args.first().copied().unwrap_or(-1);
        let mut head = NULL;
        for k in 0..self.length {
            let cell = env.new_object()?;
            env.set_data(cell, TAG_SLOT, base - k as Word)?;
            if head != NULL {
                env.set_reference(cell, LINK_SLOT, head)?;
                // The new cell keeps the rest of the list alive.
                env.release(head)?;
            }
            head = cell;
        }
        Ok(head as Word)
    }

    fn name(&self) -> &str {
        "build_list"
    }
}

/// Walk a list built by [`BuildList`] and check every tag. Returns the
/// number of cells visited.
fn verify_list(
    env: &FrameEnvironment,
    head: Handle,
    base: Word,
    length: usize,
) -> VMResult<usize> {
    let mut cursor = head;
    let mut visited = 0;
    while cursor != NULL {
        if visited == length {
            return Err(VMError::RuntimeError(format!(
                "list is longer than {} cells",
                length
            )));
        }
        let expected = base - (length - 1 - visited) as Word;
        let tag = env.get_data(cursor, TAG_SLOT)?;
        if tag != expected {
            return Err(VMError::RuntimeError(format!(
                "list cell {} carries tag {}, expected {}",
                cursor, tag, expected
            )));
        }
        let next = env.get_reference(cursor, LINK_SLOT)?;
        if cursor != head {
            env.release(cursor)?;
        }
        cursor = next;
        visited += 1;
    }
    if visited < length {
        return Err(VMError::RuntimeError(format!(
            "list has {} cells, expected {}",
            visited, length
        )));
    }
    Ok(visited)
}

/// Repeatedly build, verify and drop linked lists
///
/// Each list is built by a child call, so every iteration exercises
/// argument transfer, return promotion and reachability through links.
#[derive(Debug, Clone, Copy)]
pub struct ListChurn {
    pub iterations: usize,
    pub list_length: usize,
}

impl UserMethod for ListChurn {
    fn invoke(
        &self,
        env: &FrameEnvironment,
        _args: &[Word],
    ) -> VMResult<Word> {
        let build = BuildList {
            length: self.list_length,
        };
        let mut verified = 0;
        for i in 0..self.iterations {
            let base = -(i as Word) - 1;
            let head = env.call_method(&build, &[base])? as Handle;
            verified += verify_list(env, head, base, self.list_length)?;
            if head != NULL {
                env.release(head)?;
            }
        }
        Ok(-(verified as Word))
    }

    fn name(&self) -> &str {
        "list_churn"
    }
}

/// Seeded random allocation, linking and releasing
///
/// Keeps at most `max_live` directly held objects. On out-of-memory it
/// drops everything it holds and retries once.
#[derive(Debug, Clone, Copy)]
pub struct RandomGraph {
    pub iterations: usize,
    pub max_live: usize,
    pub seed: u64,
}

impl RandomGraph {
    fn allocate(
        env: &FrameEnvironment,
        tags: &mut HashMap<Handle, Word>,
        next_tag: &mut Word,
    ) -> VMResult<()> {
        let obj = match env.new_object() {
            Ok(obj) => obj,
            Err(e) if e.is_out_of_memory() => {
                debug!("random graph: out of memory with {} held", tags.len());
                for handle in env.active_handles() {
                    env.release(handle)?;
                }
                tags.clear();
                env.new_object()?
            }
            Err(e) => return Err(e),
        };
        env.set_data(obj, TAG_SLOT, *next_tag)?;
        tags.insert(obj, *next_tag);
        *next_tag -= 1;
        Ok(())
    }
}

impl UserMethod for RandomGraph {
    fn invoke(
        &self,
        env: &FrameEnvironment,
        _args: &[Word],
    ) -> VMResult<Word> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let width = env.heap().cell_size();
        // Tags of every object ever handed to this frame that may still be
        // reachable. Reused handles overwrite their entry on allocation.
        let mut tags: HashMap<Handle, Word> = HashMap::new();
        let mut next_tag: Word = -1;

        for _ in 0..self.iterations {
            let held = env.active_handles();
            if held.is_empty() {
                Self::allocate(env, &mut tags, &mut next_tag)?;
                continue;
            }
            let pick = held[rng.random_range(0..held.len())];
            match rng.random_range(0..4) {
                0 if held.len() < self.max_live => {
                    Self::allocate(env, &mut tags, &mut next_tag)?;
                }
                1 if width > LINK_SLOT => {
                    let target = held[rng.random_range(0..held.len())];
                    let slot = rng.random_range(LINK_SLOT..width);
                    env.set_reference(pick, slot, target)?;
                }
                2 if width > LINK_SLOT => {
                    let slot = rng.random_range(LINK_SLOT..width);
                    env.get_reference(pick, slot)?;
                }
                _ => env.release(pick)?,
            }
        }

        let held = env.active_handles();
        for &handle in &held {
            let tag = env.get_data(handle, TAG_SLOT)?;
            if tags.get(&handle) != Some(&tag) {
                return Err(VMError::RuntimeError(format!(
                    "object {} carries tag {}, expected {:?}",
                    handle,
                    tag,
                    tags.get(&handle)
                )));
            }
        }
        Ok(-(held.len() as Word))
    }

    fn name(&self) -> &str {
        "random_graph"
    }
}

/// Outcome of a concurrent workload run
#[derive(Debug)]
pub struct WorkloadReport {
    pub strategy: &'static str,
    pub outcomes: Vec<VMResult<Word>>,
    pub stats: GCStats,
    pub elapsed: Duration,
}

impl WorkloadReport {
    /// Whether every mutator thread completed without error.
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    /// First failure, if any.
    pub fn first_error(&self) -> Option<&VMError> {
        self.outcomes.iter().find_map(|outcome| outcome.as_ref().err())
    }
}

impl fmt::Display for WorkloadReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "strategy:    {}", self.strategy)?;
        for (i, outcome) in self.outcomes.iter().enumerate() {
            match outcome {
                Ok(value) => writeln!(f, "thread {}:    ok ({})", i, value)?,
                Err(e) => writeln!(f, "thread {}:    error: {}", i, e)?,
            }
        }
        writeln!(f, "allocations: {}", self.stats.allocations)?;
        writeln!(f, "collections: {}", self.stats.collections)?;
        writeln!(f, "reclaimed:   {}", self.stats.reclaimed)?;
        writeln!(f, "total pause: {:?}", self.stats.total_pause)?;
        write!(f, "elapsed:     {:?}", self.elapsed)
    }
}

fn run_programs(
    vm: &VM,
    programs: Vec<Box<dyn UserMethod>>,
) -> WorkloadReport {
    let started = Instant::now();
    let outcomes = vm.run_concurrent(&programs);
    let report = WorkloadReport {
        strategy: vm.allocator_name(),
        outcomes,
        stats: vm.gc_stats(),
        elapsed: started.elapsed(),
    };
    info!(
        "{} threads done in {:?}, {} collections",
        report.outcomes.len(),
        report.elapsed,
        report.stats.collections
    );
    report
}

/// Run [`ListChurn`] on `config.threads` mutator threads.
pub fn run_list_churn(
    vm: &VM,
    config: &WorkloadConfig,
) -> WorkloadReport {
    let programs = (0..config.threads)
        .map(|_| {
            Box::new(ListChurn {
                iterations: config.iterations,
                list_length: config.list_length,
            }) as Box<dyn UserMethod>
        })
        .collect();
    run_programs(vm, programs)
}

/// Run [`RandomGraph`] on `config.threads` mutator threads.
pub fn run_random_graph(
    vm: &VM,
    config: &WorkloadConfig,
) -> WorkloadReport {
    let programs = (0..config.threads)
        .map(|i| {
            Box::new(RandomGraph {
                iterations: config.iterations,
                max_live: config.list_length.max(1),
                seed: config.seed.wrapping_add(i as u64),
            }) as Box<dyn UserMethod>
        })
        .collect();
    run_programs(vm, programs)
}

/// Result of [`reachability_scenario`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Handle of the object that was released but still linked
    pub released: Handle,
    /// Cells the forced collection reclaimed
    pub reclaimed: usize,
    /// Cells handed out after the collection, until the heap ran out
    pub refilled: Vec<Handle>,
    /// Whether the released object was never handed out again and kept
    /// its data
    pub survived: bool,
}

/// Heap of 5 cells, 2 slots each. Allocate `a` and `b`, link `a.1 -> b`,
/// drop the frame's direct hold on `b` and force a full collection. A
/// correct strategy keeps `b` because `a` still reaches it.
pub fn reachability_scenario(strategy: AllocatorKind) -> VMResult<ScenarioReport> {
    let gc = GCConfig {
        heap_size: 5,
        cell_size: 2,
        strategy,
        ..GCConfig::default()
    };
    let vm = VM::from_gc_config(&gc, VMConfig::default())?;
    run_reachability_scenario(&vm)
}

/// The reachability scenario on an existing VM with at least two slots per
/// cell.
///
/// Cells are only cleared when they are handed out again, so reading `b`
/// right after the collection proves nothing. The heap is filled until
/// allocation fails first: `b` survived only if none of those cells was
/// `b` and its tag is intact afterwards.
pub fn run_reachability_scenario(vm: &VM) -> VMResult<ScenarioReport> {
    let report = parking_lot::Mutex::new(None);

    let program = user_method(|env, _| {
        let a = env.new_object()?;
        env.set_data(a, TAG_SLOT, -1)?;
        let b = env.new_object()?;
        env.set_reference(a, LINK_SLOT, b)?;
        env.set_data(b, TAG_SLOT, -2)?;
        env.get_reference(a, LINK_SLOT)?;
        env.release(b)?;

        let reclaimed = vm.collect()?;

        let mut refilled = Vec::new();
        for _ in env.heap().handles() {
            match env.new_object() {
                Ok(cell) => {
                    env.set_data(cell, TAG_SLOT, -3)?;
                    refilled.push(cell);
                }
                Err(VMError::OutOfMemory) => break,
                Err(e) => return Err(e),
            }
        }
        debug!("scenario refilled cells {:?}", refilled);

        let linked = env.get_reference(a, LINK_SLOT)?;
        let survived =
            linked == b && !refilled.contains(&b) && env.get_data(b, TAG_SLOT) == Ok(-2);
        *report.lock() = Some(ScenarioReport {
            released: b,
            reclaimed,
            refilled,
            survived,
        });
        Ok(0)
    });
    vm.run(&program, &[])?;
    report
        .into_inner()
        .ok_or_else(|| VMError::InvalidState("scenario did not finish".to_string()))
}
