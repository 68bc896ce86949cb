pub mod climate;
