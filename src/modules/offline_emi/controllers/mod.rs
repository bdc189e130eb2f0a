pub mod offline_emi_controller;
