//! Geometry primitives for speaker and source positions.
//!
//! Coordinate system (listener at the origin):
//! - `x`: right (+) / left (-)
//! - `y`: front (+) / back (-)
//! - `z`: up (+) / down (-)
//!
//! Azimuth is measured from the front, positive toward the right, in
//! `(-180°, 180°]`. Elevation is measured from the horizontal plane, positive
//! upward, in `[-90°, 90°]`.

use core::f32::consts::{FRAC_PI_2, PI, TAU};
use core::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Lengths below this are treated as zero.
pub const LENGTH_EPSILON: f32 = 1e-6;

/// Default tolerance for elevation layering and planar-layout detection.
pub const DEFAULT_ANGLE_TOLERANCE: Degrees = Degrees(5.0);

/// Angle in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Radians(pub f32);

/// Angle in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Degrees(pub f32);

impl Radians {
    pub const ZERO: Radians = Radians(0.0);
    pub const HALF_PI: Radians = Radians(FRAC_PI_2);
    pub const PI: Radians = Radians(PI);

    #[inline]
    pub fn get(self) -> f32 {
        self.0
    }

    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    #[inline]
    pub fn abs(self) -> Radians {
        Radians(self.0.abs())
    }

    #[inline]
    pub fn sin(self) -> f32 {
        self.0.sin()
    }

    #[inline]
    pub fn cos(self) -> f32 {
        self.0.cos()
    }

    /// Wraps into `(-π, π]`.
    pub fn wrapped(self) -> Radians {
        let mut angle = self.0 % TAU;
        if angle <= -PI {
            angle += TAU;
        } else if angle > PI {
            angle -= TAU;
        }
        Radians(angle)
    }

    /// Clamps into the valid elevation range `[-π/2, π/2]`.
    #[inline]
    pub fn clamp_elevation(self) -> Radians {
        Radians(self.0.clamp(-FRAC_PI_2, FRAC_PI_2))
    }

    /// Returns true when the two angles differ by no more than `tolerance`.
    #[inline]
    pub fn is_within(self, other: Radians, tolerance: Radians) -> bool {
        (self.0 - other.0).abs() <= tolerance.0
    }
}

impl Degrees {
    #[inline]
    pub fn get(self) -> f32 {
        self.0
    }

    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

impl From<Degrees> for Radians {
    fn from(value: Degrees) -> Self {
        value.to_radians()
    }
}

impl From<Radians> for Degrees {
    fn from(value: Radians) -> Self {
        value.to_degrees()
    }
}

impl Add for Radians {
    type Output = Radians;
    fn add(self, rhs: Radians) -> Radians {
        Radians(self.0 + rhs.0)
    }
}

impl Sub for Radians {
    type Output = Radians;
    fn sub(self, rhs: Radians) -> Radians {
        Radians(self.0 - rhs.0)
    }
}

impl Neg for Radians {
    type Output = Radians;
    fn neg(self) -> Radians {
        Radians(-self.0)
    }
}

impl Mul<f32> for Radians {
    type Output = Radians;
    fn mul(self, rhs: f32) -> Radians {
        Radians(self.0 * rhs)
    }
}

/// 3-D cartesian vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CartesianVector {
    pub const ZERO: CartesianVector = CartesianVector::new(0.0, 0.0, 0.0);
    /// Canonical direction returned for zero-length input.
    pub const FRONT: CartesianVector = CartesianVector::new(0.0, 1.0, 0.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, other: CartesianVector) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(self, other: CartesianVector) -> CartesianVector {
        CartesianVector::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.length() < LENGTH_EPSILON
    }

    /// Unit vector in the same direction, or [`CartesianVector::FRONT`] for
    /// a zero-length vector.
    pub fn normalized(self) -> CartesianVector {
        let len = self.length();
        if len < LENGTH_EPSILON {
            return Self::FRONT;
        }
        self * (1.0 / len)
    }

    /// Angle between two vectors. Zero when either vector has no length.
    pub fn angle_to(self, other: CartesianVector) -> Radians {
        let lengths = self.length() * other.length();
        if lengths < LENGTH_EPSILON {
            return Radians::ZERO;
        }
        Radians((self.dot(other) / lengths).clamp(-1.0, 1.0).acos())
    }

    #[inline]
    pub fn distance(self, other: CartesianVector) -> f32 {
        (self - other).length()
    }

    pub fn to_polar(self) -> PolarVector {
        let radius = self.length();
        if radius < LENGTH_EPSILON {
            return PolarVector::new(Radians::ZERO, Radians::ZERO, 0.0);
        }
        let horizontal = self.x.hypot(self.y);
        PolarVector {
            azimuth: Radians(self.x.atan2(self.y)),
            elevation: Radians(self.z.atan2(horizontal)),
            radius,
        }
    }
}

impl Add for CartesianVector {
    type Output = CartesianVector;
    fn add(self, rhs: CartesianVector) -> CartesianVector {
        CartesianVector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for CartesianVector {
    fn add_assign(&mut self, rhs: CartesianVector) {
        *self = *self + rhs;
    }
}

impl Sub for CartesianVector {
    type Output = CartesianVector;
    fn sub(self, rhs: CartesianVector) -> CartesianVector {
        CartesianVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for CartesianVector {
    type Output = CartesianVector;
    fn neg(self) -> CartesianVector {
        CartesianVector::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for CartesianVector {
    type Output = CartesianVector;
    fn mul(self, rhs: f32) -> CartesianVector {
        CartesianVector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Polar (azimuth, elevation, radius) vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarVector {
    pub azimuth: Radians,
    pub elevation: Radians,
    pub radius: f32,
}

impl PolarVector {
    /// Azimuth is wrapped and elevation clamped into their valid ranges.
    pub fn new(azimuth: Radians, elevation: Radians, radius: f32) -> Self {
        Self {
            azimuth: azimuth.wrapped(),
            elevation: elevation.clamp_elevation(),
            radius: radius.max(0.0),
        }
    }

    pub fn from_degrees(azimuth: f32, elevation: f32, radius: f32) -> Self {
        Self::new(
            Degrees(azimuth).to_radians(),
            Degrees(elevation).to_radians(),
            radius,
        )
    }

    pub fn to_cartesian(self) -> CartesianVector {
        let horizontal = self.radius * self.elevation.cos();
        CartesianVector::new(
            horizontal * self.azimuth.sin(),
            horizontal * self.azimuth.cos(),
            self.radius * self.elevation.sin(),
        )
    }

    /// Unit direction vector, ignoring the radius.
    pub fn direction(self) -> CartesianVector {
        PolarVector {
            radius: 1.0,
            ..self
        }
        .to_cartesian()
    }
}

/// A position stored in both cartesian and polar form.
///
/// Both forms are derived from one another on every construction and
/// update, so they never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CartesianVector", into = "CartesianVector")]
pub struct Position {
    cartesian: CartesianVector,
    polar: PolarVector,
    direction: CartesianVector,
}

impl Default for Position {
    fn default() -> Self {
        Self::from_polar(PolarVector::new(Radians::ZERO, Radians::ZERO, 1.0))
    }
}

impl Position {
    pub fn from_cartesian(cartesian: CartesianVector) -> Self {
        let polar = cartesian.to_polar();
        Self {
            cartesian,
            polar,
            direction: cartesian.normalized(),
        }
    }

    pub fn from_polar(polar: PolarVector) -> Self {
        let polar = PolarVector::new(polar.azimuth, polar.elevation, polar.radius);
        Self {
            cartesian: polar.to_cartesian(),
            polar,
            direction: polar.direction(),
        }
    }

    /// Position from azimuth and elevation in degrees.
    pub fn from_degrees(azimuth: f32, elevation: f32, radius: f32) -> Self {
        Self::from_polar(PolarVector::from_degrees(azimuth, elevation, radius))
    }

    #[inline]
    pub fn cartesian(&self) -> CartesianVector {
        self.cartesian
    }

    #[inline]
    pub fn polar(&self) -> PolarVector {
        self.polar
    }

    #[inline]
    pub fn azimuth(&self) -> Radians {
        self.polar.azimuth
    }

    #[inline]
    pub fn elevation(&self) -> Radians {
        self.polar.elevation
    }

    /// Unit direction. Zero-length positions face front.
    #[inline]
    pub fn direction(&self) -> CartesianVector {
        self.direction
    }

    /// Unclamped distance from the listener, used for distance attenuation.
    #[inline]
    pub fn radius(&self) -> f32 {
        self.polar.radius
    }

    /// Distance clamped to `[0, 1]`, used for panning.
    #[inline]
    pub fn panning_radius(&self) -> f32 {
        self.polar.radius.clamp(0.0, 1.0)
    }

    pub fn set_cartesian(&mut self, cartesian: CartesianVector) {
        *self = Self::from_cartesian(cartesian);
    }

    pub fn set_polar(&mut self, polar: PolarVector) {
        *self = Self::from_polar(polar);
    }

    pub fn set_radius(&mut self, radius: f32) {
        let polar = PolarVector {
            radius,
            ..self.polar
        };
        self.set_polar(polar);
    }

    /// False when any coordinate or the radius is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.cartesian.is_finite()
            && self.direction.is_finite()
            && self.polar.radius.is_finite()
            && self.polar.azimuth.get().is_finite()
            && self.polar.elevation.get().is_finite()
    }

    /// Angle between the directions of two positions.
    pub fn angle_to(&self, other: &Position) -> Radians {
        self.direction.angle_to(other.direction)
    }
}

impl From<CartesianVector> for Position {
    fn from(value: CartesianVector) -> Self {
        Self::from_cartesian(value)
    }
}

impl From<Position> for CartesianVector {
    fn from(value: Position) -> Self {
        value.cartesian
    }
}
