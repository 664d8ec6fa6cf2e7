mod lseek;
mod read;
mod write;
mod writev;
