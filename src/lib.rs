pub mod analyzers;
pub mod backtest;
pub mod config;
pub mod cycle;
pub mod error;
pub mod features;
pub mod fetch;
pub mod filter;
pub mod mapping;
pub mod output;
pub mod parser;
pub mod projection;
pub mod settle;
pub mod slips;
pub mod staking;
