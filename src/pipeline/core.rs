// In: src/pipeline/core.rs

//! The pipeline engine: stage graph, frame/batch residency, movement, object
//! accessors and the apply/clear side of the update queue.
//!
//! Locking, in the only order it is ever acquired:
//! 1. `graph` (`RwLock<GraphState>`): stages, residency, batches, the frame table.
//!    Movement takes it for writing; accessors hold it for reading just long enough
//!    to clone a frame's `Arc`.
//! 2. Per-frame `RwLock<VideoFrame>`, several at once only in ascending id order.
//! 3. `updates` (the `UpdateQueue`'s internal mutex).

use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{MissingIdPolicy, PipelineConfig};
use crate::error::{Result, StagepipeError};
use crate::pipeline::stage::{Stage, StagePayloadType};
use crate::pipeline::update::{FrameUpdate, PendingUpdate, UpdateQueue};
use crate::types::{
    AttributeValue, BoundingBox, FrameBatch, ObjectTextField, TrackingInfo, VideoFrame,
    VideoObject,
};

type FrameCell = Arc<RwLock<VideoFrame>>;

//==================================================================================
// 1. Residency & Results
//==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    /// Directly resident in the stage at this index.
    Stage(usize),
    /// Packed inside this batch.
    Batch(i64),
}

/// Where an id currently lives, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Stage {
        stage: String,
        payload: StagePayloadType,
    },
    Batch(i64),
}

/// The result of a capacity-guarded unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackOutcome {
    /// The batch was removed and its frames now reside in the destination stage,
    /// listed in pack order.
    Unpacked(Vec<i64>),
    /// The guard rejected the member count; nothing moved.
    NeedsCapacity(usize),
}

/// A point-in-time summary of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames: usize,
    pub batches: usize,
    /// `(stage name, resident count)` in graph order.
    pub stages: Vec<(String, usize)>,
}

//==================================================================================
// 2. Graph State
//==================================================================================

#[derive(Debug, Default)]
struct GraphState {
    stages: Vec<Stage>,
    stage_index: HashMap<String, usize>,
    frames: HashMap<i64, FrameCell>,
    batches: HashMap<i64, FrameBatch>,
    residency: HashMap<i64, Residency>,
    /// Shared by frames and batches, so the two id spaces never overlap.
    id_counter: i64,
}

impl GraphState {
    /// Checks an unpack request and returns `(source, destination)` stage indices.
    fn unpack_route(&self, dest_stage: &str, batch_id: i64) -> Result<(usize, usize)> {
        let dest = self.stage_idx(dest_stage)?;
        self.expect_payload(dest, StagePayloadType::Frame)?;
        match self.residency.get(&batch_id) {
            Some(Residency::Stage(src)) if self.batches.contains_key(&batch_id) => Ok((*src, dest)),
            Some(_) => Err(StagepipeError::NotABatch(batch_id)),
            None => Err(StagepipeError::UnknownId(batch_id)),
        }
    }

    fn stage_idx(&self, name: &str) -> Result<usize> {
        self.stage_index
            .get(name)
            .copied()
            .ok_or_else(|| StagepipeError::StageNotFound(name.to_owned()))
    }

    fn next_id(&mut self) -> i64 {
        self.id_counter += 1;
        self.id_counter
    }

    fn expect_payload(&self, idx: usize, actual: StagePayloadType) -> Result<()> {
        let stage = &self.stages[idx];
        if stage.payload() != actual {
            return Err(StagepipeError::StageTypeMismatch {
                stage: stage.name().to_owned(),
                expected: stage.payload(),
                actual,
            });
        }
        Ok(())
    }

    /// Stage index of an independent frame, or the reason it is not one.
    fn independent_frame_stage(&self, id: i64) -> Result<usize> {
        match self.residency.get(&id) {
            Some(Residency::Stage(idx)) if self.frames.contains_key(&id) => Ok(*idx),
            Some(_) => Err(StagepipeError::NotAnIndependentFrame(id)),
            None => Err(StagepipeError::UnknownId(id)),
        }
    }

    fn relocate(&mut self, id: i64, from: usize, to: usize) {
        self.stages[from].remove(id);
        self.stages[to].insert(id);
        self.residency.insert(id, Residency::Stage(to));
    }
}

//==================================================================================
// 3. Pipeline
//==================================================================================

/// A fixed graph of named stages and the frames and batches moving through it.
///
/// Every method takes `&self`; a `Pipeline` is meant to be shared behind an `Arc`
/// and called from any number of threads.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    missing_id_policy: MissingIdPolicy,
    graph: RwLock<GraphState>,
    updates: UpdateQueue,
}

impl Pipeline {
    /// Builds the stage graph described by `config`.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut state = GraphState::default();
        for (idx, stage) in config.stages.iter().enumerate() {
            state.stages.push(Stage::new(&stage.name, stage.payload));
            state.stage_index.insert(stage.name.clone(), idx);
        }
        debug!(
            "pipeline '{}' created with {} stages",
            config.name,
            state.stages.len()
        );
        Ok(Self {
            name: config.name.clone(),
            missing_id_policy: config.missing_id_policy,
            graph: RwLock::new(state),
            updates: UpdateQueue::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------------
    // 3.1 Inspection
    // -----------------------------------------------------------------------------

    pub fn stage_names(&self) -> Vec<String> {
        self.graph
            .read()
            .stages
            .iter()
            .map(|s| s.name().to_owned())
            .collect()
    }

    pub fn get_stage_type(&self, stage: &str) -> Option<StagePayloadType> {
        let graph = self.graph.read();
        let idx = graph.stage_idx(stage).ok()?;
        Some(graph.stages[idx].payload())
    }

    /// Number of frames or batches resident in `stage`.
    pub fn stage_len(&self, stage: &str) -> Option<usize> {
        let graph = self.graph.read();
        let idx = graph.stage_idx(stage).ok()?;
        Some(graph.stages[idx].len())
    }

    /// Ids resident in `stage`, in allocation order.
    pub fn stage_ids(&self, stage: &str) -> Option<Vec<i64>> {
        let graph = self.graph.read();
        let idx = graph.stage_idx(stage).ok()?;
        Some(graph.stages[idx].ids())
    }

    pub fn locate(&self, id: i64) -> Option<Location> {
        let graph = self.graph.read();
        match graph.residency.get(&id)? {
            Residency::Stage(idx) => {
                let stage = &graph.stages[*idx];
                Some(Location::Stage {
                    stage: stage.name().to_owned(),
                    payload: stage.payload(),
                })
            }
            Residency::Batch(batch_id) => Some(Location::Batch(*batch_id)),
        }
    }

    /// A snapshot copy of the frame, whether independent or batched.
    pub fn get_frame(&self, frame_id: i64) -> Option<VideoFrame> {
        let cell = self.frame_cell(frame_id)?;
        let frame = cell.read().clone();
        Some(frame)
    }

    pub fn get_batch(&self, batch_id: i64) -> Option<FrameBatch> {
        self.graph.read().batches.get(&batch_id).cloned()
    }

    pub fn stats(&self) -> PipelineStats {
        let graph = self.graph.read();
        PipelineStats {
            frames: graph.frames.len(),
            batches: graph.batches.len(),
            stages: graph
                .stages
                .iter()
                .map(|s| (s.name().to_owned(), s.len()))
                .collect(),
        }
    }

    // -----------------------------------------------------------------------------
    // 3.2 Ingestion & Removal
    // -----------------------------------------------------------------------------

    /// Places a new frame into a `Frame` stage and returns its id.
    pub fn add_frame(&self, stage: &str, frame: VideoFrame) -> Result<i64> {
        let mut graph = self.graph.write();
        let idx = graph.stage_idx(stage)?;
        graph.expect_payload(idx, StagePayloadType::Frame)?;

        let id = graph.next_id();
        graph.frames.insert(id, Arc::new(RwLock::new(frame)));
        graph.stages[idx].insert(id);
        graph.residency.insert(id, Residency::Stage(idx));
        log_metric!("event" = "add_frame", "pipeline" = self.name, "id" = id, "stage" = stage);
        Ok(id)
    }

    /// Removes an independent frame or a whole batch (members included), along
    /// with anything pending against it.
    pub fn delete(&self, id: i64) -> Result<()> {
        let mut graph = self.graph.write();
        let idx = match graph.residency.get(&id) {
            Some(Residency::Stage(idx)) => *idx,
            Some(Residency::Batch(_)) => return Err(StagepipeError::NotAnIndependentFrame(id)),
            None => return Err(StagepipeError::UnknownId(id)),
        };

        graph.stages[idx].remove(id);
        graph.residency.remove(&id);
        if graph.frames.remove(&id).is_none() {
            if let Some(batch) = graph.batches.remove(&id) {
                for frame_id in batch.into_frames() {
                    graph.frames.remove(&frame_id);
                    graph.residency.remove(&frame_id);
                }
            }
        }
        self.updates.clear(id);
        debug!("pipeline '{}': deleted {}", self.name, id);
        Ok(())
    }

    // -----------------------------------------------------------------------------
    // 3.3 Movement
    // -----------------------------------------------------------------------------

    /// Moves frames or batches to `dest_stage` unchanged and returns how many moved.
    ///
    /// An empty `ids` moves everything resident in the stage just before
    /// `dest_stage` (nothing, if `dest_stage` is first). Unknown ids follow the
    /// configured `MissingIdPolicy`. An id whose kind does not match the
    /// destination, or a frame that sits inside a batch, fails the whole call.
    pub fn move_as_is(&self, dest_stage: &str, ids: &[i64]) -> Result<usize> {
        let mut graph = self.graph.write();
        let dest = graph.stage_idx(dest_stage)?;

        let requested = if ids.is_empty() {
            match dest.checked_sub(1) {
                Some(prev) => graph.stages[prev].ids(),
                None => return Ok(0),
            }
        } else {
            ids.to_vec()
        };

        let mut seen = HashSet::with_capacity(requested.len());
        let mut plan = Vec::with_capacity(requested.len());
        for id in requested {
            if !seen.insert(id) {
                continue;
            }
            match graph.residency.get(&id) {
                Some(Residency::Stage(src)) => {
                    graph.expect_payload(dest, graph.stages[*src].payload())?;
                    plan.push((id, *src));
                }
                Some(Residency::Batch(_)) => {
                    return Err(StagepipeError::NotAnIndependentFrame(id));
                }
                None => match self.missing_id_policy {
                    MissingIdPolicy::Skip => {
                        warn!(
                            "pipeline '{}': move_as_is skips unknown id {}",
                            self.name, id
                        );
                    }
                    MissingIdPolicy::Abort => return Err(StagepipeError::UnknownId(id)),
                },
            }
        }

        for (id, src) in &plan {
            graph.relocate(*id, *src, dest);
        }
        log_metric!("event" = "move_as_is", "pipeline" = self.name, "dest" = dest_stage, "moved" = plan.len());
        Ok(plan.len())
    }

    /// Packs independent frames into a new batch placed in `dest_stage` and returns
    /// the batch id. All-or-nothing: any unknown, repeated or already batched id
    /// fails the call before anything is touched.
    ///
    /// Updates pending against the frames travel with them into the batch queue.
    pub fn move_and_pack_frames(&self, dest_stage: &str, frame_ids: &[i64]) -> Result<i64> {
        if frame_ids.is_empty() {
            return Err(StagepipeError::EmptyBatch);
        }
        let mut graph = self.graph.write();
        let dest = graph.stage_idx(dest_stage)?;
        graph.expect_payload(dest, StagePayloadType::Batch)?;

        let mut seen = HashSet::with_capacity(frame_ids.len());
        let mut sources = Vec::with_capacity(frame_ids.len());
        for &id in frame_ids {
            if !seen.insert(id) {
                return Err(StagepipeError::DuplicateFrameId(id));
            }
            sources.push(graph.independent_frame_stage(id)?);
        }

        let batch_id = graph.next_id();
        for (&id, src) in frame_ids.iter().zip(sources) {
            graph.stages[src].remove(id);
            graph.residency.insert(id, Residency::Batch(batch_id));
        }
        graph
            .batches
            .insert(batch_id, FrameBatch::new(batch_id, frame_ids.to_vec()));
        graph.stages[dest].insert(batch_id);
        graph.residency.insert(batch_id, Residency::Stage(dest));

        let mut carried = Vec::new();
        for &id in frame_ids {
            if let Some(pending) = self.updates.take(id) {
                carried.extend(pending);
            }
        }
        log_metric!("event" = "pack", "batch_id" = batch_id, "frames" = frame_ids.len(), "carried_updates" = carried.len());
        self.updates.extend(batch_id, carried);

        debug!(
            "pipeline '{}': packed {} frames into batch {} at '{}'",
            self.name,
            frame_ids.len(),
            batch_id,
            dest_stage
        );
        Ok(batch_id)
    }

    /// Dissolves a batch, placing each member frame in `dest_stage`, and returns
    /// the member ids in pack order.
    pub fn move_and_unpack_batch(&self, dest_stage: &str, batch_id: i64) -> Result<Vec<i64>> {
        let mut graph = self.graph.write();
        let (src, dest) = graph.unpack_route(dest_stage, batch_id)?;
        self.dissolve_batch(&mut graph, src, dest, batch_id)
    }

    /// Like `move_and_unpack_batch`, but asks `accept` about the member count first,
    /// under the same lock as the move. If `accept` says no, nothing moves and the
    /// required count comes back as `NeedsCapacity`.
    pub fn move_and_unpack_batch_guarded<F>(
        &self,
        dest_stage: &str,
        batch_id: i64,
        accept: F,
    ) -> Result<UnpackOutcome>
    where
        F: FnOnce(usize) -> bool,
    {
        let mut graph = self.graph.write();
        let (src, dest) = graph.unpack_route(dest_stage, batch_id)?;

        let required = graph.batches.get(&batch_id).map_or(0, FrameBatch::len);
        if !accept(required) {
            return Ok(UnpackOutcome::NeedsCapacity(required));
        }
        self.dissolve_batch(&mut graph, src, dest, batch_id)
            .map(UnpackOutcome::Unpacked)
    }

    fn dissolve_batch(
        &self,
        graph: &mut GraphState,
        src: usize,
        dest: usize,
        batch_id: i64,
    ) -> Result<Vec<i64>> {
        let frames = match graph.batches.remove(&batch_id) {
            Some(batch) => batch.into_frames(),
            None => return Err(StagepipeError::NotABatch(batch_id)),
        };
        graph.stages[src].remove(batch_id);
        graph.residency.remove(&batch_id);
        for &frame_id in &frames {
            graph.stages[dest].insert(frame_id);
            graph.residency.insert(frame_id, Residency::Stage(dest));
        }

        if let Some(pending) = self.updates.take(batch_id) {
            for update in pending {
                self.updates.push(update.frame_id, update);
            }
        }

        debug!(
            "pipeline '{}': unpacked batch {} into {} frames at '{}'",
            self.name,
            batch_id,
            frames.len(),
            graph.stages[dest].name()
        );
        Ok(frames)
    }

    // -----------------------------------------------------------------------------
    // 3.4 Deferred Updates
    // -----------------------------------------------------------------------------

    /// Stages an update against an independent frame.
    pub fn add_frame_update(&self, frame_id: i64, update: FrameUpdate) -> Result<()> {
        let graph = self.graph.read();
        graph.independent_frame_stage(frame_id)?;
        self.updates.push(frame_id, PendingUpdate { frame_id, update });
        Ok(())
    }

    /// Stages an update against one member of a batch.
    pub fn add_batched_frame_update(
        &self,
        batch_id: i64,
        frame_id: i64,
        update: FrameUpdate,
    ) -> Result<()> {
        let graph = self.graph.read();
        let batch = graph
            .batches
            .get(&batch_id)
            .ok_or(StagepipeError::NotABatch(batch_id))?;
        if !batch.contains(frame_id) {
            return Err(StagepipeError::NotInBatch { batch_id, frame_id });
        }
        self.updates.push(batch_id, PendingUpdate { frame_id, update });
        Ok(())
    }

    pub fn pending_updates(&self, id: i64) -> usize {
        self.updates.pending_len(id)
    }

    /// Commits everything pending for a frame or batch, in staging order.
    ///
    /// Returns `Ok(false)` if nothing was pending. The target frames stay
    /// write-locked for the whole call and commands run against copies, so readers
    /// see either all of the updates or none of them. If any command fails, live
    /// state is left untouched, the pending updates are put back, and the error is
    /// returned.
    pub fn apply_updates(&self, id: i64) -> Result<bool> {
        let graph = self.graph.read();

        let mut targets: Vec<i64> = match graph.residency.get(&id) {
            None => return Ok(false),
            Some(_) if graph.frames.contains_key(&id) => vec![id],
            Some(_) => match graph.batches.get(&id) {
                Some(batch) => batch.frames().to_vec(),
                None => return Ok(false),
            },
        };
        targets.sort_unstable();

        let cells: Vec<(i64, FrameCell)> = targets
            .iter()
            .filter_map(|fid| graph.frames.get(fid).map(|cell| (*fid, Arc::clone(cell))))
            .collect();
        let mut guards: Vec<(i64, RwLockWriteGuard<'_, VideoFrame>)> =
            cells.iter().map(|(fid, cell)| (*fid, cell.write())).collect();

        let pending = match self.updates.take(id) {
            Some(pending) => pending,
            None => return Ok(false),
        };

        let mut working: HashMap<i64, VideoFrame> = HashMap::new();
        let mut outcome = Ok(());
        for item in &pending {
            let frame = match working.entry(item.frame_id) {
                hashbrown::hash_map::Entry::Occupied(e) => e.into_mut(),
                hashbrown::hash_map::Entry::Vacant(e) => {
                    match guards.iter().find(|(fid, _)| *fid == item.frame_id) {
                        Some((_, guard)) => e.insert((**guard).clone()),
                        None => {
                            outcome = Err(StagepipeError::NotInBatch {
                                batch_id: id,
                                frame_id: item.frame_id,
                            });
                            break;
                        }
                    }
                }
            };
            if let Err(e) = item.update.apply_to(item.frame_id, frame) {
                outcome = Err(e);
                break;
            }
        }

        if let Err(source) = outcome {
            warn!(
                "pipeline '{}': apply_updates({}) rolled back: {}",
                self.name, id, source
            );
            self.updates.restore(id, pending);
            return Err(StagepipeError::UpdateFailed {
                id,
                source: Box::new(source),
            });
        }

        for (fid, guard) in guards.iter_mut() {
            if let Some(frame) = working.remove(fid) {
                **guard = frame;
            }
        }
        log_metric!("event" = "apply_updates", "pipeline" = self.name, "id" = id, "updates" = pending.len());
        Ok(true)
    }

    /// Drops everything pending for `id`. Returns whether anything was dropped.
    pub fn clear_updates(&self, id: i64) -> bool {
        self.updates.clear(id)
    }

    // -----------------------------------------------------------------------------
    // 3.5 Object Field Accessors
    // -----------------------------------------------------------------------------

    fn frame_cell(&self, frame_id: i64) -> Option<FrameCell> {
        self.graph.read().frames.get(&frame_id).cloned()
    }

    fn read_object<R>(
        &self,
        frame_id: i64,
        object_id: i64,
        f: impl FnOnce(&VideoObject) -> R,
    ) -> Option<R> {
        let cell = self.frame_cell(frame_id)?;
        let frame = cell.read();
        frame.get_object(object_id).map(f)
    }

    fn write_object(
        &self,
        frame_id: i64,
        object_id: i64,
        f: impl FnOnce(&mut VideoObject),
    ) -> bool {
        let Some(cell) = self.frame_cell(frame_id) else {
            return false;
        };
        let mut frame = cell.write();
        match frame.get_object_mut(object_id) {
            Some(object) => {
                f(object);
                true
            }
            None => false,
        }
    }

    /// A snapshot copy of one object.
    pub fn get_object(&self, frame_id: i64, object_id: i64) -> Option<VideoObject> {
        self.read_object(frame_id, object_id, VideoObject::clone)
    }

    /// `None` when the object is unknown or has no confidence.
    pub fn get_confidence(&self, frame_id: i64, object_id: i64) -> Option<f32> {
        self.read_object(frame_id, object_id, |o| o.confidence)
            .flatten()
    }

    pub fn set_confidence(&self, frame_id: i64, object_id: i64, confidence: f32) -> bool {
        self.write_object(frame_id, object_id, |o| o.confidence = Some(confidence))
    }

    pub fn clear_confidence(&self, frame_id: i64, object_id: i64) -> bool {
        self.write_object(frame_id, object_id, |o| o.confidence = None)
    }

    pub fn get_detection_box(&self, frame_id: i64, object_id: i64) -> Option<BoundingBox> {
        self.read_object(frame_id, object_id, |o| o.detection_box)
    }

    pub fn set_detection_box(&self, frame_id: i64, object_id: i64, bbox: BoundingBox) -> bool {
        self.write_object(frame_id, object_id, |o| o.detection_box = bbox)
    }

    pub fn get_tracking_info(&self, frame_id: i64, object_id: i64) -> Option<TrackingInfo> {
        self.read_object(frame_id, object_id, |o| o.tracking)
            .flatten()
    }

    pub fn set_tracking_info(
        &self,
        frame_id: i64,
        object_id: i64,
        bbox: BoundingBox,
        tracking_id: i64,
    ) -> bool {
        self.write_object(frame_id, object_id, |o| {
            o.tracking = Some(TrackingInfo::new(bbox, tracking_id))
        })
    }

    pub fn clear_tracking_info(&self, frame_id: i64, object_id: i64) -> bool {
        self.write_object(frame_id, object_id, |o| o.tracking = None)
    }

    pub fn get_object_text(
        &self,
        frame_id: i64,
        object_id: i64,
        field: ObjectTextField,
    ) -> Option<String> {
        self.read_object(frame_id, object_id, |o| field.read(o))
    }

    pub fn get_namespace(&self, frame_id: i64, object_id: i64) -> Option<String> {
        self.get_object_text(frame_id, object_id, ObjectTextField::Namespace)
    }

    pub fn get_label(&self, frame_id: i64, object_id: i64) -> Option<String> {
        self.get_object_text(frame_id, object_id, ObjectTextField::Label)
    }

    pub fn get_draw_label(&self, frame_id: i64, object_id: i64) -> Option<String> {
        self.get_object_text(frame_id, object_id, ObjectTextField::DrawLabel)
    }

    /// The object attribute value at `index` under `(namespace, name)`.
    pub fn get_attribute_value(
        &self,
        frame_id: i64,
        object_id: i64,
        namespace: &str,
        name: &str,
        index: usize,
    ) -> Option<AttributeValue> {
        self.read_object(frame_id, object_id, |o| {
            o.attributes.get_value(namespace, name, index).cloned()
        })
        .flatten()
    }

    /// The frame-level attribute value at `index` under `(namespace, name)`.
    pub fn get_frame_attribute_value(
        &self,
        frame_id: i64,
        namespace: &str,
        name: &str,
        index: usize,
    ) -> Option<AttributeValue> {
        let cell = self.frame_cell(frame_id)?;
        let frame = cell.read();
        frame.attributes.get_value(namespace, name, index).cloned()
    }
}
