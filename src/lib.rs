//  Copyright 2024 MrCroxx
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! A trace-driven graph workload benchmark harness: statistical request
//! shaping over a semantically-constrained edge graph, a batch loader, and
//! a rate-paced experiment runner, all generic over a pluggable [`driver::Driver`]
//! backend.

pub mod cli;
pub mod config;
pub mod constants;
pub mod driver;
pub mod edge;
pub mod generator;
pub mod key;
pub mod keypool;
pub mod loader;
pub mod measurements;
pub mod runner;
pub mod status;
pub mod testdb;
pub mod utils;
pub mod worker;
pub mod workload;
