mod solver;

pub use solver::SolverAdapter;
