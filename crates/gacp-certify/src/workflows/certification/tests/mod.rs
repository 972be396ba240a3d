mod cache;
mod certificates;
mod common;
mod payments;
mod queue;
