//! Release velocity estimation for thrown objects.
//!
//! Per-tick hand velocity is noisy right at release (the hand usually slows
//! down just before the trigger fires), so the estimate is centred on the
//! fastest recent sample instead of using the last one or a window average.

use std::collections::VecDeque;
use glam::Vec3;

/// Number of velocity samples kept per manipulator
pub const DEFAULT_THROW_WINDOW: usize = 10;

/// Fixed-size FIFO of per-tick velocity samples, oldest first
#[derive(Debug, Clone)]
pub struct ThrowVelocityEstimator {
    samples: VecDeque<Vec3>,
    capacity: usize,
    previous_position: Option<Vec3>,
    last_velocity: Vec3,
}

impl ThrowVelocityEstimator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: std::iter::repeat(Vec3::ZERO).take(capacity).collect(),
            capacity,
            previous_position: None,
            last_velocity: Vec3::ZERO,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest to newest
    pub fn samples(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.samples.iter().copied()
    }

    pub fn latest(&self) -> Vec3 {
        self.samples.back().copied().unwrap_or(Vec3::ZERO)
    }

    /// Record the tracking point position for this tick and push a velocity sample.
    ///
    /// With `dt <= 0` (or no previous position yet) the previous estimate is
    /// pushed again; the stored position is updated either way.
    pub fn sample(&mut self, position: Vec3, dt: f32) -> Vec3 {
        if let Some(previous) = self.previous_position {
            if dt > 0.0 {
                self.last_velocity = (position - previous) / dt;
            }
        }
        self.previous_position = Some(position);
        self.push(self.last_velocity);
        self.last_velocity
    }

    /// Push a velocity sample directly, dropping the oldest
    pub fn push(&mut self, velocity: Vec3) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(velocity);
    }

    /// Restart displacement tracking from `position` without touching the samples
    pub fn reseed(&mut self, position: Vec3) {
        self.previous_position = Some(position);
    }

    /// Zero every sample and forget the previous position
    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = Vec3::ZERO);
        self.previous_position = None;
        self.last_velocity = Vec3::ZERO;
    }

    /// Average of the fastest sample and its immediate neighbours.
    ///
    /// Ties go to the earliest sample. At the buffer edges only the one
    /// existing neighbour is included, so the divisor is 2 or 3.
    pub fn estimate_release_velocity(&self) -> Vec3 {
        let mut peak = 0;
        let mut peak_speed = 0.0;
        for (i, v) in self.samples.iter().enumerate() {
            let speed = v.length();
            if speed > peak_speed {
                peak = i;
                peak_speed = speed;
            }
        }

        let start = peak.saturating_sub(1);
        let end = (peak + 1).min(self.samples.len() - 1);
        let window = self.samples.range(start..=end);
        let count = window.len() as f32;
        window.fold(Vec3::ZERO, |sum, v| sum + *v) / count
    }
}

impl Default for ThrowVelocityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_THROW_WINDOW)
    }
}
