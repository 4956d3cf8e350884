// Agent side: sampling loop, report loop and their barrier
pub mod agent;

// Primary/backup tier bridging
pub mod checkpoint;

// Collector operations behind both servers
pub mod collector;

// Process lifecycle
pub mod system;

// Wiring of both binaries from configuration
pub mod bootstrap;
