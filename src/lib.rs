//! Render-based camera tracking against a signed distance field.
//!
//! For every sampled depth point the tracker evaluates a smooth energy of the
//! SDF value it lands on and the analytic 6-DoF pose Jacobian of that
//! energy. The kernels are pure functions over a read-only
//! [`DistanceField`](field::DistanceField), so the same code runs in a
//! sequential loop or mapped over a Rayon pool by [`tracker::evaluate_frame`].
//!
//! ```text
//! depth image ─ unproject ─▶ points ─┬─ energy   ─┐
//!                                    └─ jacobian ─┴─▶ NormalEquations ─▶ pose solver
//! ```
//!
//! [`RenTrackerPlugin`] runs passes in the background inside a Bevy app and
//! writes a [`PassCompleted`](plugin::PassCompleted) message when each one lands.

pub mod energy;
pub mod error;
pub mod field;
pub mod gradient;
pub mod jacobian;
pub mod logger;
pub mod plugin;
pub mod tracker;
pub mod types;
pub mod unproject;
pub mod volume;

pub use plugin::RenTrackerPlugin;
