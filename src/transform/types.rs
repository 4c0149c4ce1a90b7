use cgmath::{ElementWise, InnerSpace, One, Quaternion, Rotation, Vector3, VectorSpace, Zero};

/// Position, rotation and scale treated as one opaque value. Combination
/// order is scale, then rotate, then translate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zero(),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Applies `local` inside `self`'s space: the result places `local`
    /// relative to `self`.
    pub fn combine(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position
                + self
                    .rotation
                    .rotate_vector(local.position.mul_element_wise(self.scale)),
            rotation: self.rotation * local.rotation,
            scale: self.scale.mul_element_wise(local.scale),
        }
    }

    /// Inverse under [`combine`](Self::combine): `t.combine(&t.inverse())`
    /// is identity. Exact for uniform scale, the usual approximation for
    /// non-uniform scale under rotation.
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.invert();
        let inv_scale = Vector3::new(
            1.0 / self.scale.x,
            1.0 / self.scale.y,
            1.0 / self.scale.z,
        );
        Transform {
            position: inv_rotation
                .rotate_vector(-self.position)
                .mul_element_wise(inv_scale),
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Blend between two transforms; positions and scales lerp, rotations
    /// slerp. `t` is clamped to `[0, 1]`.
    pub fn interpolate(a: &Transform, b: &Transform, t: f32) -> Transform {
        let t = t.clamp(0.0, 1.0);
        let rotation = if a.rotation.dot(b.rotation).abs() > 0.9995 {
            b.rotation
        } else {
            a.rotation.slerp(b.rotation, t)
        };
        Transform {
            position: a.position.lerp(b.position, t),
            rotation,
            scale: a.scale.lerp(b.scale, t),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
