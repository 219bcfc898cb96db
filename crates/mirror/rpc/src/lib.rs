#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod api;
pub use api::{DebugApiClient, ZondApiClient};

mod beacon;
pub use beacon::{BeaconClient, BeaconValidatorDetails, BeaconValidatorEntry, BeaconValidatorsPage};

mod client;
pub use client::{JsonRpcNodeClient, NodeClient, NodeClientBuilder};

mod erc20;
pub use erc20::{
    BALANCE_OF_SELECTOR, DECIMALS_SELECTOR, NAME_SELECTOR, SYMBOL_SELECTOR, TOTAL_SUPPLY_SELECTOR,
    balance_of_call, decode_decimals, decode_string, decode_uint, selector_call,
};

mod error;
pub use error::RpcError;

mod market;
pub use market::{MarketClient, MarketResponse};

mod schema;
pub use schema::{
    CallFrame, CallRequest, LogFilter, RpcBlock, RpcLog, RpcReceipt, RpcTransaction,
    TRANSFER_EVENT_TOPIC, TraceOptions,
};
