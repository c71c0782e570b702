pub mod yuy2;
