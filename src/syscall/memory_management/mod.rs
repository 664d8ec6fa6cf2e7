mod brk;
mod mmap;
mod mprotect;
mod munmap;
