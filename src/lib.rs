pub mod config;
pub mod context;
pub mod datum;
pub mod error;
pub mod fetch;
pub mod fragment;
pub mod graph;
pub mod headless;
pub mod logging;
pub mod option;
pub mod pages;
pub mod registry;
pub mod surface;
pub mod widget;
pub mod worker;
