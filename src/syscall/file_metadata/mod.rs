mod access;
mod fstat;
mod getcwd;
