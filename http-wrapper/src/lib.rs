pub mod client;
pub use client::{
    ClientConfig, Error, HubResponse, RequestResult, ResourceScope, Scheme, ServiceClient,
};

pub mod api;
pub use api::{DeviceEndpoint, Registry};

pub use reqwest::{Method, StatusCode};
