pub mod columns;
pub mod snapshot;
