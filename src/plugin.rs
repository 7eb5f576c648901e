use std::{marker::PhantomData, sync::Arc};

use bevy::{
    prelude::*,
    tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future},
};
use tracing::{debug, error};

use crate::{
    field::DistanceField,
    tracker::{FrameEvaluation, TrackingConfig, evaluate_frame},
    types::{HomPoint, Pose},
};

/// System sets for the tracking pipeline.
///
/// Use these to order your own systems relative to tracking:
///
/// ```rust,ignore
/// // Feed the solver as soon as a pass lands:
/// app.add_systems(Update, update_pose.after(RenTrackerSet::Complete));
/// ```
///
/// ```text
/// RenTrackerSet::Queue  →  RenTrackerSet::Spawn  →  [async compute]  →  RenTrackerSet::Complete
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenTrackerSet {
    /// Marks new or changed [`TrackingPass`]es as queued.
    Queue,
    /// Spawns an async compute task for each queued pass.
    Spawn,
    /// Polls async tasks, inserts [`TrackingOutcome`] and writes [`PassCompleted`].
    Complete,
}

/// One frame's worth of tracking input: the scene snapshot, the sampled
/// reference points and the pose hypothesis to evaluate them at.
///
/// `field` and `points` are shared through [`Arc`] so the background task can
/// read them without copying. The field must not be mutated while a pass is
/// in flight; swap in a new `Arc` instead.
#[derive(Component)]
pub struct TrackingPass<F: DistanceField + Send + 'static> {
    pub field: Arc<F>,
    pub points: Arc<Vec<HomPoint>>,
    pub pose: Pose,
}

impl<F: DistanceField + Send + 'static> TrackingPass<F> {
    pub fn new(field: Arc<F>, points: Arc<Vec<HomPoint>>, pose: Pose) -> Self {
        Self {
            field,
            points,
            pose,
        }
    }
}

/// Marker component added to [`TrackingPass`] entities waiting to be evaluated.
///
/// Removed once the pass completes. Insert it by hand to re-run a pass, or
/// when the `auto_queue` feature is disabled.
#[derive(Component)]
pub struct QueuedPass;

/// Holds the in-flight async compute task for a [`TrackingPass`].
///
/// Removing it (or despawning the entity) drops the task, which cancels it.
#[derive(Component)]
pub struct PassTask(Task<FrameEvaluation>);

/// Result of the most recent completed pass on this entity.
#[derive(Component, Debug, Clone)]
pub struct TrackingOutcome(pub FrameEvaluation);

/// Written once per completed pass so a presentation layer can refresh.
///
/// Carries no data; read [`TrackingOutcome`] for results.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassCompleted;

/// Start/stop switch for background tracking.
///
/// While `paused`, no new passes are started; passes already running finish
/// normally.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackingControl {
    pub paused: bool,
}

/// Bevy plugin that runs tracking passes against fields of type `F`.
///
/// Evaluation runs on Bevy's `AsyncComputeTaskPool` so the main thread is
/// never blocked:
///
/// ```text
/// TrackingPass inserted or changed
///   → QueuedPass inserted           (RenTrackerSet::Queue, `auto_queue` feature)
///   → PassTask spawned              (RenTrackerSet::Spawn)
///   → [async compute runs]
///   → TrackingOutcome inserted      (RenTrackerSet::Complete)
///   → PassCompleted written
///   → QueuedPass + PassTask removed
/// ```
pub struct RenTrackerPlugin<F> {
    /// Initial value for the [`TrackingConfig`] resource.
    pub config: TrackingConfig,
    _field: PhantomData<fn() -> F>,
}

impl<F> Default for RenTrackerPlugin<F> {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

impl<F> RenTrackerPlugin<F> {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            _field: PhantomData,
        }
    }
}

impl<F: DistanceField + Send + 'static> Plugin for RenTrackerPlugin<F> {
    fn build(&self, app: &mut App) {
        let config = match self.config.validate() {
            Ok(()) => self.config.clone(),
            Err(err) => {
                error!(%err, "invalid tracking configuration, falling back to defaults");
                TrackingConfig::default()
            }
        };

        app.insert_resource(config)
            .init_resource::<TrackingControl>()
            .add_message::<PassCompleted>()
            .configure_sets(
                Update,
                (
                    RenTrackerSet::Queue,
                    RenTrackerSet::Spawn,
                    RenTrackerSet::Complete,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (
                    spawn_tracking_tasks::<F>.in_set(RenTrackerSet::Spawn),
                    poll_tracking_tasks.in_set(RenTrackerSet::Complete),
                ),
            );

        #[cfg(feature = "auto_queue")]
        app.add_systems(Update, on_pass_changed::<F>.in_set(RenTrackerSet::Queue));
    }
}

/// Queues every new or changed [`TrackingPass`], cancelling any stale task.
#[cfg_attr(not(feature = "auto_queue"), allow(dead_code))]
fn on_pass_changed<F: DistanceField + Send + 'static>(
    mut commands: Commands,
    query: Query<Entity, Changed<TrackingPass<F>>>,
) {
    for entity in query.iter() {
        commands
            .entity(entity)
            .remove::<PassTask>()
            .insert(QueuedPass);
    }
}

/// Spawns async compute tasks for [`QueuedPass`]es, up to
/// [`TrackingConfig::max_passes_per_frame`] per frame.
fn spawn_tracking_tasks<F: DistanceField + Send + 'static>(
    mut commands: Commands,
    config: Res<TrackingConfig>,
    control: Res<TrackingControl>,
    query: Query<(Entity, &TrackingPass<F>), (With<QueuedPass>, Without<PassTask>)>,
) {
    if control.paused {
        return;
    }

    let task_pool = AsyncComputeTaskPool::get();

    for (entity, pass) in query.iter().take(config.max_passes_per_frame) {
        // Arc::clone is a single pointer bump; nothing is copied on the main thread.
        let field = Arc::clone(&pass.field);
        let points = Arc::clone(&pass.points);
        let pose = pass.pose;
        let pass_config = TrackingConfig::clone(&config);

        debug!(?entity, points = points.len(), "starting tracking pass");
        let task = task_pool
            .spawn(async move { evaluate_frame(&points, field.as_ref(), &pose, &pass_config) });

        commands.entity(entity).insert(PassTask(task));
    }
}

/// Polls in-flight [`PassTask`]s and publishes finished ones.
///
/// Non-blocking: tasks that haven't finished are skipped and retried next frame.
fn poll_tracking_tasks(
    mut commands: Commands,
    mut query: Query<(Entity, &mut PassTask)>,
    mut completed: MessageWriter<PassCompleted>,
) {
    for (entity, mut task) in query.iter_mut() {
        if let Some(evaluation) = block_on(future::poll_once(&mut task.0)) {
            debug!(
                ?entity,
                valid = evaluation.normal_equations.valid,
                acceptable = evaluation.quality.acceptable,
                "tracking pass completed"
            );
            commands
                .entity(entity)
                .insert(TrackingOutcome(evaluation))
                .remove::<(PassTask, QueuedPass)>();
            completed.write(PassCompleted);
        }
    }
}
