use crate::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use num_traits::Float;

/// Solver options for [`emd_with_options`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmdOptions {
    /// Maximum number of simplex pivots before giving up.
    pub max_iter: usize,
    /// Absolute tolerance accepted between the total masses of both marginals.
    pub mass_tolerance: f64,
}

impl Default for EmdOptions {
    fn default() -> Self {
        Self {
            max_iter: 100_000,
            mass_tolerance: 1e-6,
        }
    }
}

/// Optimal plan and diagnostics returned by [`emd_with_options`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmdSolution<F> {
    /// Dense transport plan with the shape of the cost matrix.
    pub plan: Array2<F>,
    /// Total transport cost `sum(plan * m)`.
    pub cost: F,
    /// Number of simplex pivots performed.
    pub iterations: usize,
}

/// Solve the exact Earth Mover's Distance problem and return the optimal plan.
///
/// Parity with `ot.lp.emd(a, b, M)` of the Python Optimal Transport library.
///
/// # Parameters
/// * `a` : (ns,) source histogram, non-negative.
/// * `b` : (nt,) target histogram, non-negative, same total mass as `a`.
/// * `m` : (ns, nt) finite cost matrix.
///
/// # Examples
/// ```
/// use audiot_core::lp::emd;
/// use ndarray::array;
///
/// let a = array![0.5, 0.5];
/// let b = array![0.5, 0.5];
/// let m = array![[1.0, 0.0], [0.0, 1.0]];
///
/// let plan = emd(a.view(), b.view(), m.view()).unwrap();
/// assert_eq!(plan, array![[0.0, 0.5], [0.5, 0.0]]);
/// ```
pub fn emd<F: Float>(a: ArrayView1<F>, b: ArrayView1<F>, m: ArrayView2<F>) -> Result<Array2<F>> {
    emd_with_options(a, b, m, &EmdOptions::default()).map(|solution| solution.plan)
}

/// Solve the exact Earth Mover's Distance problem with explicit solver options.
///
/// Bins carrying no mass are dropped before solving and come back as zero
/// rows/columns of the plan. `b` is rescaled to the total mass of `a` once the
/// two totals agree within `options.mass_tolerance`.
///
/// The solver is a transportation simplex started from the north-west corner
/// rule, so the returned plan is a vertex of the transport polytope with at
/// most `ns + nt - 1` nonzero entries.
pub fn emd_with_options<F: Float>(
    a: ArrayView1<F>,
    b: ArrayView1<F>,
    m: ArrayView2<F>,
    options: &EmdOptions,
) -> Result<EmdSolution<F>> {
    validate_problem(a, b, m)?;

    let source_mass = a.iter().fold(F::zero(), |acc, &w| acc + w);
    let target_mass = b.iter().fold(F::zero(), |acc, &w| acc + w);
    let (source_f64, target_f64) = (
        source_mass.to_f64().unwrap_or(f64::NAN),
        target_mass.to_f64().unwrap_or(f64::NAN),
    );
    if !(source_f64 > 0.0 && target_f64 > 0.0)
        || (source_f64 - target_f64).abs() > options.mass_tolerance
    {
        return Err(Error::Infeasible {
            source_mass: source_f64,
            target_mass: target_f64,
        });
    }
    let scale = source_mass / target_mass;

    let rows: Vec<usize> = nonzero_bins(a);
    let cols: Vec<usize> = nonzero_bins(b);
    let supply: Vec<F> = rows.iter().map(|&i| a[i]).collect();
    let demand: Vec<F> = cols.iter().map(|&j| b[j] * scale).collect();
    let mut costs = Vec::with_capacity(rows.len() * cols.len());
    for &i in &rows {
        costs.extend(cols.iter().map(|&j| m[[i, j]]));
    }

    let mut tree = SpanningTree::north_west_corner(&supply, &demand);
    let iterations = tree.optimize(&costs, options.max_iter)?;

    let mut plan = Array2::zeros(m.raw_dim());
    let mut cost = F::zero();
    for cell in tree.cells.iter().filter(|cell| cell.flow > F::zero()) {
        let (i, j) = (rows[cell.row], cols[cell.col]);
        plan[[i, j]] = plan[[i, j]] + cell.flow;
        cost = cost + cell.flow * m[[i, j]];
    }

    tracing::debug!(
        rows = rows.len(),
        cols = cols.len(),
        iterations,
        cost = cost.to_f64().unwrap_or(f64::NAN),
        "emd solved"
    );

    Ok(EmdSolution {
        plan,
        cost,
        iterations,
    })
}

fn validate_problem<F: Float>(a: ArrayView1<F>, b: ArrayView1<F>, m: ArrayView2<F>) -> Result<()> {
    if a.is_empty() {
        return Err(Error::invalid_arg("a", "source histogram must be non-empty"));
    }
    if b.is_empty() {
        return Err(Error::invalid_arg("b", "target histogram must be non-empty"));
    }
    if m.dim() != (a.len(), b.len()) {
        return Err(Error::invalid_arg(
            "m",
            format!(
                "cost matrix shape {:?} does not match histograms ({}, {})",
                m.dim(),
                a.len(),
                b.len()
            ),
        ));
    }
    if a.iter().any(|w| !w.is_finite() || *w < F::zero()) {
        return Err(Error::invalid_arg(
            "a",
            "source histogram must be finite and non-negative",
        ));
    }
    if b.iter().any(|w| !w.is_finite() || *w < F::zero()) {
        return Err(Error::invalid_arg(
            "b",
            "target histogram must be finite and non-negative",
        ));
    }
    if m.iter().any(|c| !c.is_finite()) {
        return Err(Error::invalid_arg("m", "cost matrix must be finite"));
    }
    Ok(())
}

fn nonzero_bins<F: Float>(weights: ArrayView1<F>) -> Vec<usize> {
    weights
        .indexed_iter()
        .filter(|(_, w)| **w > F::zero())
        .map(|(i, _)| i)
        .collect()
}

/// Entering-cell rule of the simplex.
///
/// Dantzig converges in few pivots but may cycle on degenerate bases. Bland
/// (lowest-index improving cell, lowest-index leaving cell) cannot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotRule {
    Dantzig,
    Bland,
}

#[derive(Debug, Clone, Copy)]
struct BasicCell<F> {
    row: usize,
    col: usize,
    flow: F,
}

/// Basis of the transportation simplex.
///
/// Nodes `0..rows` are supplies, `rows..rows + cols` are demands. The basic
/// cells are the edges of a spanning tree over those nodes, so there are
/// always exactly `rows + cols - 1` of them (degenerate cells carry zero flow).
#[derive(Debug)]
struct SpanningTree<F> {
    rows: usize,
    cols: usize,
    cells: Vec<BasicCell<F>>,
    adjacency: Vec<Vec<usize>>,
}

impl<F: Float> SpanningTree<F> {
    fn north_west_corner(supply: &[F], demand: &[F]) -> Self {
        let (rows, cols) = (supply.len(), demand.len());
        let mut supply = supply.to_vec();
        let mut demand = demand.to_vec();
        let mut tree = Self {
            rows,
            cols,
            cells: Vec::with_capacity(rows + cols - 1),
            adjacency: vec![Vec::new(); rows + cols],
        };

        let (mut i, mut j) = (0, 0);
        loop {
            let flow = supply[i].min(demand[j]);
            supply[i] = supply[i] - flow;
            demand[j] = demand[j] - flow;
            tree.insert(BasicCell { row: i, col: j, flow });

            if i + 1 == rows && j + 1 == cols {
                break;
            }
            if i + 1 == rows {
                j += 1;
            } else if j + 1 == cols || supply[i] <= demand[j] {
                i += 1;
            } else {
                j += 1;
            }
        }
        tree
    }

    fn insert(&mut self, cell: BasicCell<F>) {
        self.cells.push(cell);
        self.link(self.cells.len() - 1);
    }

    fn link(&mut self, slot: usize) {
        let cell = self.cells[slot];
        self.adjacency[cell.row].push(slot);
        self.adjacency[self.rows + cell.col].push(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let cell = self.cells[slot];
        self.adjacency[cell.row].retain(|&s| s != slot);
        self.adjacency[self.rows + cell.col].retain(|&s| s != slot);
    }

    fn other_end(&self, slot: usize, node: usize) -> usize {
        let cell = self.cells[slot];
        if node < self.rows {
            self.rows + cell.col
        } else {
            cell.row
        }
    }

    fn cost(&self, costs: &[F], cell: BasicCell<F>) -> F {
        costs[cell.row * self.cols + cell.col]
    }

    /// Run simplex pivots until no reduced cost is negative.
    ///
    /// Pivots follow [`PivotRule::Dantzig`] until `rows + cols` degenerate
    /// pivots happen in a row, then [`PivotRule::Bland`] until flow moves again.
    fn optimize(&mut self, costs: &[F], max_iter: usize) -> Result<usize> {
        let scale = costs.iter().fold(F::one(), |acc, c| acc.max(c.abs()));
        let tolerance = scale * F::epsilon() * F::from(64.0).unwrap_or_else(F::one);
        let stall_limit = self.rows + self.cols;

        let mut iterations = 0;
        let mut stalled = 0;
        loop {
            let rule = if stalled >= stall_limit {
                PivotRule::Bland
            } else {
                PivotRule::Dantzig
            };
            let (u, v) = self.potentials(costs);
            let Some((row, col)) = self.entering_cell(costs, &u, &v, tolerance, rule) else {
                return Ok(iterations);
            };
            if iterations == max_iter {
                return Err(Error::IterationLimit { max_iter });
            }
            let cycle = self.path(row, self.rows + col);
            let theta = self.pivot(row, col, &cycle);
            iterations += 1;
            if theta > F::zero() {
                stalled = 0;
            } else {
                stalled += 1;
            }
            tracing::trace!(iterations, row, col, ?rule, "simplex pivot");
        }
    }

    /// Dual potentials with `u[0] = 0` and `u[i] + v[j] = c[i, j]` on every basic cell.
    fn potentials(&self, costs: &[F]) -> (Vec<F>, Vec<F>) {
        let mut u = vec![F::zero(); self.rows];
        let mut v = vec![F::zero(); self.cols];
        let mut visited = vec![false; self.rows + self.cols];
        let mut stack = vec![0];
        visited[0] = true;

        while let Some(node) = stack.pop() {
            for &slot in &self.adjacency[node] {
                let next = self.other_end(slot, node);
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                let cell = self.cells[slot];
                let cost = self.cost(costs, cell);
                if next < self.rows {
                    u[cell.row] = cost - v[cell.col];
                } else {
                    v[cell.col] = cost - u[cell.row];
                }
                stack.push(next);
            }
        }
        (u, v)
    }

    /// Cell with a reduced cost below `-tolerance`, chosen by `rule`.
    fn entering_cell(
        &self,
        costs: &[F],
        u: &[F],
        v: &[F],
        tolerance: F,
        rule: PivotRule,
    ) -> Option<(usize, usize)> {
        let mut best = None;
        let mut best_reduced = -tolerance;
        for (i, row) in costs.chunks_exact(self.cols).enumerate() {
            for (j, &c) in row.iter().enumerate() {
                let reduced = c - u[i] - v[j];
                if reduced < best_reduced {
                    if rule == PivotRule::Bland {
                        return Some((i, j));
                    }
                    best_reduced = reduced;
                    best = Some((i, j));
                }
            }
        }
        best
    }

    /// Basic cells on the tree path between two nodes, ordered from `from`.
    fn path(&self, from: usize, to: usize) -> Vec<usize> {
        let mut via: Vec<Option<usize>> = vec![None; self.rows + self.cols];
        let mut visited = vec![false; self.rows + self.cols];
        let mut stack = vec![from];
        visited[from] = true;

        while let Some(node) = stack.pop() {
            if node == to {
                break;
            }
            for &slot in &self.adjacency[node] {
                let next = self.other_end(slot, node);
                if !visited[next] {
                    visited[next] = true;
                    via[next] = Some(slot);
                    stack.push(next);
                }
            }
        }

        let mut path = Vec::new();
        let mut node = to;
        while let Some(slot) = via[node] {
            path.push(slot);
            node = self.other_end(slot, node);
        }
        path.reverse();
        path
    }

    /// Push flow around the cycle closed by the entering cell and return the
    /// amount moved.
    ///
    /// Cells at even positions of `cycle` give flow, odd positions receive it.
    /// Among donors tied for the smallest flow, the lowest `(row, col)` leaves.
    fn pivot(&mut self, row: usize, col: usize, cycle: &[usize]) -> F {
        let index = |cell: BasicCell<F>| (cell.row, cell.col);
        let mut leaving = cycle[0];
        let mut theta = self.cells[leaving].flow;
        for &slot in cycle.iter().step_by(2) {
            let cell = self.cells[slot];
            if cell.flow < theta || (cell.flow == theta && index(cell) < index(self.cells[leaving])) {
                theta = cell.flow;
                leaving = slot;
            }
        }

        for (k, &slot) in cycle.iter().enumerate() {
            let cell = &mut self.cells[slot];
            cell.flow = if k % 2 == 0 {
                (cell.flow - theta).max(F::zero())
            } else {
                cell.flow + theta
            };
        }

        self.unlink(leaving);
        self.cells[leaving] = BasicCell {
            row,
            col,
            flow: theta,
        };
        self.link(leaving);
        theta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{array, Array1, Axis};
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn normalized(weights: Vec<f64>) -> Array1<f64> {
        let total: f64 = weights.iter().sum();
        Array1::from(weights) / total
    }

    #[test]
    fn moves_single_atom() {
        let a = array![1.0, 0.0, 0.0, 0.0];
        let b = array![0.0, 0.0, 0.0, 1.0];
        let x = array![0.0, 10.0, 20.0, 30.0];
        let m = Array2::from_shape_fn((4, 4), |(i, j)| (x[i] - x[j]) * (x[i] - x[j]));

        let solution = emd_with_options(a.view(), b.view(), m.view(), &EmdOptions::default())
            .expect("feasible problem");
        let mut expected = Array2::zeros((4, 4));
        expected[[0, 3]] = 1.0;
        assert_eq!(solution.plan, expected);
        assert_relative_eq!(solution.cost, 900.0);
    }

    #[test]
    fn identical_histograms_stay_in_place() {
        let a = array![0.1, 0.2, 0.3, 0.4];
        let m = Array2::from_shape_fn((4, 4), |(i, j)| (i as f64 - j as f64).abs());
        let solution = emd_with_options(a.view(), a.view(), m.view(), &EmdOptions::default())
            .expect("feasible problem");
        assert_abs_diff_eq!(solution.cost, 0.0);
        assert_eq!(solution.plan, Array2::from_diag(&a));
    }

    #[test]
    fn pivots_away_from_north_west_corner() {
        let a = array![0.5, 0.5];
        let m = array![[1.0, 0.0], [0.0, 1.0]];
        let solution = emd_with_options(a.view(), a.view(), m.view(), &EmdOptions::default())
            .expect("feasible problem");
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.plan, array![[0.0, 0.5], [0.5, 0.0]]);
        assert_abs_diff_eq!(solution.cost, 0.0);
    }

    #[test]
    fn reports_iteration_limit() {
        let a = array![0.5, 0.5];
        let m = array![[1.0, 0.0], [0.0, 1.0]];
        let options = EmdOptions {
            max_iter: 0,
            ..EmdOptions::default()
        };
        let err = emd_with_options(a.view(), a.view(), m.view(), &options)
            .expect_err("one pivot is required");
        assert_eq!(err, Error::IterationLimit { max_iter: 0 });
    }

    #[test]
    fn rejects_unbalanced_marginals() {
        let a = array![0.5, 0.5];
        let b = array![0.25, 0.25];
        let m = Array2::<f64>::zeros((2, 2));
        let err = emd(a.view(), b.view(), m.view()).expect_err("unbalanced");
        assert!(matches!(err, Error::Infeasible { .. }));
    }

    #[test]
    fn rejects_zero_mass_and_bad_inputs() {
        let z = array![0.0, 0.0];
        let m = Array2::<f64>::zeros((2, 2));
        assert!(matches!(
            emd(z.view(), z.view(), m.view()),
            Err(Error::Infeasible { .. })
        ));

        let a = array![0.5, 0.5];
        let bad_shape = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            emd(a.view(), a.view(), bad_shape.view()),
            Err(Error::InvalidArg { .. })
        ));

        let infinite = array![[0.0, f64::INFINITY], [1.0, 0.0]];
        assert!(matches!(
            emd(a.view(), a.view(), infinite.view()),
            Err(Error::InvalidArg { .. })
        ));

        let negative = array![1.5, -0.5];
        assert!(matches!(
            emd(negative.view(), a.view(), m.view()),
            Err(Error::InvalidArg { .. })
        ));
    }

    #[test]
    fn keeps_zero_bins_in_plan_shape() {
        let a = array![0.0, 0.6, 0.0, 0.4, 0.0];
        let b = array![0.3, 0.0, 0.7];
        let m = Array2::from_shape_fn((5, 3), |(i, j)| (i as f64 - 2.0 * j as f64).powi(2));
        let plan = emd(a.view(), b.view(), m.view()).expect("feasible problem");
        assert_eq!(plan.dim(), (5, 3));
        assert!(plan.row(0).iter().all(|&p| p == 0.0));
        assert!(plan.column(1).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn matches_closed_form_wasserstein_on_the_line() {
        // W1 on the line equals the integral of |CDF_a - CDF_b|; rows are shuffled so
        // the initial basis is not already the monotone coupling.
        let mut rng = rand::rng();
        for _ in 0..20 {
            let n = rng.random_range(3..24);
            let x: Vec<f64> = (0..n).map(|k| k as f64 * 1.5).collect();
            let a = normalized((0..n).map(|_| rng.random_range(0.0..1.0)).collect());
            let b = normalized((0..n).map(|_| rng.random_range(0.0..1.0)).collect());

            let mut expected = 0.0;
            let (mut cdf_a, mut cdf_b) = (0.0, 0.0);
            for k in 0..n - 1 {
                cdf_a += a[k];
                cdf_b += b[k];
                expected += (cdf_a - cdf_b).abs() * (x[k + 1] - x[k]);
            }

            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);
            let shuffled_a = Array1::from_iter(order.iter().map(|&i| a[i]));
            let m = Array2::from_shape_fn((n, n), |(i, j)| (x[order[i]] - x[j]).abs());

            let solution =
                emd_with_options(shuffled_a.view(), b.view(), m.view(), &EmdOptions::default())
                    .expect("feasible problem");
            assert_relative_eq!(solution.cost, expected, epsilon = 1e-9);

            let row_sums = solution.plan.sum_axis(Axis(1));
            let col_sums = solution.plan.sum_axis(Axis(0));
            for (got, want) in row_sums.iter().zip(shuffled_a.iter()) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
            for (got, want) in col_sums.iter().zip(b.iter()) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
            let nonzero = solution.plan.iter().filter(|&&p| p > 0.0).count();
            assert!(nonzero < 2 * n);
        }
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for perm in permutations(n - 1) {
            for slot in 0..n {
                let mut next = perm.clone();
                next.insert(slot, n - 1);
                out.push(next);
            }
        }
        out
    }

    #[test]
    fn degenerate_assignments_reach_the_optimum() {
        // Uniform marginals make every north-west corner basis degenerate and
        // small integer costs make reduced-cost ties common.
        let mut rng = rand::rng();
        let n = 5;
        let perms = permutations(n);
        let a = Array1::from_elem(n, 1.0 / n as f64);
        for _ in 0..50 {
            let m = Array2::from_shape_fn((n, n), |_| rng.random_range(0..4) as f64);
            let best = perms
                .iter()
                .map(|p| p.iter().enumerate().map(|(i, &j)| m[[i, j]]).sum::<f64>())
                .fold(f64::INFINITY, f64::min)
                / n as f64;
            let solution = emd_with_options(a.view(), a.view(), m.view(), &EmdOptions::default())
                .expect("feasible problem");
            assert_abs_diff_eq!(solution.cost, best, epsilon = 1e-12);
        }
    }

    #[test]
    fn bland_rule_takes_the_first_improving_cell() {
        // North-west corner basis of a 3x3 unit problem is
        // (0,0) (1,0) (1,1) (2,1) (2,2), all with zero cost, so every potential
        // is zero and reduced costs equal the raw costs.
        let tree = SpanningTree::north_west_corner(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]);
        let costs = [0.0, -1.0, -5.0, 0.0, 0.0, -2.0, -3.0, 0.0, 0.0];
        let (u, v) = tree.potentials(&costs);
        assert_eq!(
            tree.entering_cell(&costs, &u, &v, 1e-12, PivotRule::Dantzig),
            Some((0, 2))
        );
        assert_eq!(
            tree.entering_cell(&costs, &u, &v, 1e-12, PivotRule::Bland),
            Some((0, 1))
        );
        let optimal = [0.0; 9];
        assert_eq!(tree.entering_cell(&optimal, &u, &v, 1e-12, PivotRule::Bland), None);
    }

    #[test]
    fn solves_rectangular_problems_in_f32() {
        let a = array![0.2f32, 0.3, 0.5];
        let b = array![0.5f32, 0.5];
        let m = array![[0.0f32, 4.0], [1.0, 1.0], [4.0, 0.0]];
        let solution = emd_with_options(a.view(), b.view(), m.view(), &EmdOptions::default())
            .expect("feasible problem");
        assert_relative_eq!(solution.cost, 0.3, epsilon = 1e-6);
        assert_relative_eq!(solution.plan.sum(), 1.0, epsilon = 1e-6);
    }
}
