pub mod plan_controller;
