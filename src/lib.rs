//! # Answerbase
//!
//! A hybrid retrieval engine for a customer-support knowledge base.
//!
//! Answerbase ingests support documents from connectors, chunks them into
//! parent/child records, embeds the children, and serves hybrid retrieval
//! (cosine vector search + BM25 keyword search) over an atomically
//! swappable in-memory index backed by SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Connectors  │──▶│  Ingestion   │──▶│  Generation  │
//! │ (wiki, fs)  │   │ Chunk+Embed  │   │ swap+SQLite  │
//! └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                  ┌───────────┐       ┌───────────┐
//!                  │  Hybrid   │       │    CLI    │
//!                  │ Retriever │       │   (abx)   │
//!                  └───────────┘       └───────────┘
//! ```
//!
//! Readers always see a complete generation: a refresh builds the next
//! index off to the side and installs it with a single pointer swap.
//! A failed refresh leaves the previous generation serving.
//!
//! ## Quick Start
//!
//! ```bash
//! abx init                      # create database
//! abx sync                      # run one ingestion cycle
//! abx search "refund policy"    # hybrid retrieval
//! abx run                       # periodic background refresh
//! abx stats                     # index overview
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Document-to-child splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Generation snapshots over SQLite |
//! | [`keyword`] | In-memory BM25 index |
//! | [`retriever`] | Hybrid vector + keyword retrieval |
//! | [`ingest`] | Background ingestion pipeline |
//! | [`connector`] | Document-source connectors |
//! | [`connector_fs`] | Filesystem connector |
//! | [`cache`] | TTL answer cache |
//! | [`limiter`] | Sliding-window rate limiter |
//! | [`stats`] | Index statistics command |
//! | [`db`] | Database connection |

pub mod cache;
pub mod chunker;
pub mod config;
pub mod connector;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod keyword;
pub mod limiter;
pub mod models;
pub mod retriever;
pub mod stats;
pub mod store;
