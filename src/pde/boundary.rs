//! Boundary condition records for the PDE solver.

/// The kind of condition imposed at a spatial endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Pins the solution value at the boundary.
    Dirichlet,
    /// Pins the spatial derivative at the boundary.
    Neumann,
    /// Pins a linear combination of the solution and its derivative:
    /// `order0(t)*u + order1(t)*u_x = value(t)`.
    Robin,
}

/// Everything the solver needs to know about one spatial endpoint: the kind
/// of condition, its location, and the (time-varying) condition value. The
/// `order0`/`order1` coefficients are meaningful only for Robin conditions.
pub struct BoundaryCondition {
    kind: BoundaryKind,
    location: f64,
    value: Box<dyn Fn(f64) -> f64>,
    order0: Box<dyn Fn(f64) -> f64>,
    order1: Box<dyn Fn(f64) -> f64>,
}

impl BoundaryCondition {
    /// A Dirichlet condition `u(location, t) = value(t)`.
    pub fn dirichlet<V>(location: f64, value: V) -> Self
    where
        V: Fn(f64) -> f64 + 'static,
    {
        Self {
            kind: BoundaryKind::Dirichlet,
            location,
            value: Box::new(value),
            order0: Box::new(|_| 0.0),
            order1: Box::new(|_| 0.0),
        }
    }

    /// A Neumann condition `u_x(location, t) = value(t)`.
    pub fn neumann<V>(location: f64, value: V) -> Self
    where
        V: Fn(f64) -> f64 + 'static,
    {
        Self {
            kind: BoundaryKind::Neumann,
            location,
            value: Box::new(value),
            order0: Box::new(|_| 0.0),
            order1: Box::new(|_| 0.0),
        }
    }

    /// A Robin condition `order0(t)*u + order1(t)*u_x = value(t)` at
    /// `location`.
    pub fn robin<V, P, Q>(location: f64, value: V, order0: P, order1: Q) -> Self
    where
        V: Fn(f64) -> f64 + 'static,
        P: Fn(f64) -> f64 + 'static,
        Q: Fn(f64) -> f64 + 'static,
    {
        Self {
            kind: BoundaryKind::Robin,
            location,
            value: Box::new(value),
            order0: Box::new(order0),
            order1: Box::new(order1),
        }
    }

    /// The condition kind.
    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    /// The spatial location of the boundary.
    pub fn location(&self) -> f64 {
        self.location
    }

    /// The condition value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        (self.value)(t)
    }

    /// The Robin solution coefficient at time `t`.
    pub fn order0(&self, t: f64) -> f64 {
        (self.order0)(t)
    }

    /// The Robin derivative coefficient at time `t`.
    pub fn order1(&self, t: f64) -> f64 {
        (self.order1)(t)
    }
}

impl std::fmt::Debug for BoundaryCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryCondition")
            .field("kind", &self.kind)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
