//! b2d-nfs library - exposes internal modules for testing
//!
//! Switches a boot2docker VM from the VirtualBox shared folder to an NFS
//! mount of the host's `/Users`, see [`pipeline::Pipeline`].

pub mod boot2docker;
pub mod bootlocal;
pub mod config;
pub mod error;
pub mod exec;
pub mod exports;
pub mod pipeline;
pub mod records;
pub mod vbox;
