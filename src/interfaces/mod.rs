/// Interfaces Layer - External Entry Points
///
/// ## Modules
/// - `cli`: Command-line interface (main.rs logic) and the demo session

pub mod cli;
