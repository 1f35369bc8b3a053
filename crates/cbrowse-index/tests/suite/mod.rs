mod memory_queries;
mod provider;
