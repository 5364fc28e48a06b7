//! `wchar_t` strings for property and component names

use super::sys::wchar_t;

/// NUL-terminated wide copy of `s`
pub fn to_wide(s: &str) -> Vec<wchar_t> {
    #[cfg(windows)]
    let mut wide: Vec<wchar_t> = s.encode_utf16().collect();
    #[cfg(not(windows))]
    let mut wide: Vec<wchar_t> = s.chars().map(|c| c as wchar_t).collect();
    wide.push(0);
    wide
}

/// Read a NUL-terminated wide string owned by the runtime
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated `wchar_t` sequence.
pub unsafe fn from_wide(ptr: *const wchar_t) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);

    #[cfg(windows)]
    {
        String::from_utf16_lossy(units)
    }
    #[cfg(not(windows))]
    {
        units
            .iter()
            .map(|u| char::from_u32(*u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated() {
        let wide = to_wide("HevcQP_I");
        assert_eq!(wide.len(), 9);
        assert_eq!(*wide.last().unwrap(), 0);
        assert_eq!(wide[0], 'H' as wchar_t);
    }

    #[test]
    fn test_read_back() {
        let wide = to_wide("AMFVideoEncoderHW_AV1");
        assert_eq!(unsafe { from_wide(wide.as_ptr()) }, "AMFVideoEncoderHW_AV1");
        assert_eq!(unsafe { from_wide(std::ptr::null()) }, "");
    }
}
