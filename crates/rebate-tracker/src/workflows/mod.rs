pub mod rebate;
