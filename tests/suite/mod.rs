mod cli;
mod workflow;
