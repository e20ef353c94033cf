pub mod materializer;
pub mod part_reader;
pub mod sinks;

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
