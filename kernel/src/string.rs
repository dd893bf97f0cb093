pub fn memset(dst: *mut u8, c: u8, n: usize) -> *mut u8 {
    for i in 0..n {
        unsafe { dst.add(i).write(c) }
    }
    dst
}

/// Like C's `memmove`: correct even when `src` and `dst` overlap.
pub fn memmove(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    if n == 0 || dst as usize == src as usize {
        return dst;
    }
    if (dst as usize) < (src as usize) {
        for i in 0..n {
            unsafe { dst.add(i).write(src.add(i).read()) }
        }
    } else {
        for i in (0..n).rev() {
            unsafe { dst.add(i).write(src.add(i).read()) }
        }
    }
    dst
}

/// Length of a NUL-terminated byte string, not counting the NUL.
pub fn strlen(s: *const u8) -> usize {
    let mut n = 0;
    unsafe {
        while s.add(n).read() != 0 {
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memmove_handles_forward_overlap() {
        let mut buf = [1u8, 2, 3, 4, 5, 0, 0, 0];
        let p = buf.as_mut_ptr();
        unsafe {
            memmove(p.add(2), p, 5);
        }
        assert_eq!(&buf[2..7], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn strlen_counts_to_nul() {
        let s = b"hello\0world";
        assert_eq!(strlen(s.as_ptr()), 5);
    }
}
