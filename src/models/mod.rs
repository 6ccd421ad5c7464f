//! 数据模型模块

pub mod activity;
