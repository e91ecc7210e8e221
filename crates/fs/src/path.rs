//! 路径解析
//!
//! 路径以 `/` 分隔；以 `/` 开头为绝对路径，否则相对当前工作目录。
//! [`split`] 将路径拆成父目录与末级名字两部分：
//!
//! ```text
//! "/a/b/c" -> ("/a/b", "c")
//! "a/b/c/" -> ("a/b",  "c")
//! "a///b/" -> ("a",    "b")
//! "/a"     -> ("/",    "a")
//! "/"      -> ("",     "/")
//! "a"      -> ("",     "a")
//! ```

use alloc::string::String;

/// 路径分隔符
pub const PATH_SEPARATOR: char = '/';

/// 判断 path 是否为绝对路径。
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(PATH_SEPARATOR)
}

/// 将路径拆分为 (父目录, 末级名字)。
///
/// 末级名字之后的分隔符被忽略；无法拆分时父目录为空串。
pub fn split(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.is_empty() {
        return ("", "");
    }

    // 跳过末尾的分隔符，定位名字的结束位置。
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b'/' {
        end -= 1;
    }
    if end == 0 {
        // 整个路径都是分隔符（如 "/"），名字就是路径本身。
        return ("", path);
    }

    // 向左找到名字的起始位置。
    let mut begin = end;
    while begin > 0 && bytes[begin - 1] != b'/' {
        begin -= 1;
    }
    let base = &path[begin..end];
    if begin == 0 {
        // 名字前没有分隔符，父目录为空。
        return ("", base);
    }

    // 跳过名字前的连续分隔符。
    let mut parent_end = begin - 1;
    while parent_end > 0 && bytes[parent_end - 1] == b'/' {
        parent_end -= 1;
    }
    if parent_end == 0 {
        // 一路退到开头仍是分隔符：父目录是根。
        return (&path[..1], base);
    }

    (&path[..parent_end], base)
}

/// 拼接两段路径。path2 为绝对路径时直接取 path2。
pub fn combine(path1: &str, path2: &str) -> String {
    if is_absolute(path2) || path1.is_empty() {
        return String::from(path2);
    }

    let mut out = String::from(path1);
    if !out.ends_with(PATH_SEPARATOR) {
        out.push(PATH_SEPARATOR);
    }
    out.push_str(path2);
    out
}

/// 依次产出路径中的非空组件。
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_corner_cases() {
        assert_eq!(split("/a/b/c"), ("/a/b", "c"));
        assert_eq!(split("a/b/c/"), ("a/b", "c"));
        assert_eq!(split("a///b/"), ("a", "b"));
        assert_eq!(split("/a"), ("/", "a"));
        assert_eq!(split("/"), ("", "/"));
        assert_eq!(split("a"), ("", "a"));
        assert_eq!(split(""), ("", ""));
    }

    #[test]
    fn test_split_deep_separators() {
        assert_eq!(split("//a"), ("/", "a"));
        assert_eq!(split("/a//b"), ("/a", "b"));
        assert_eq!(split("a/b///"), ("a", "b"));
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/"));
        assert!(is_absolute("/a/b"));
        assert!(!is_absolute(""));
        assert!(!is_absolute("a/b"));
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine("/a", "b"), "/a/b");
        assert_eq!(combine("/a/", "b"), "/a/b");
        assert_eq!(combine("/a", "/b"), "/b");
        assert_eq!(combine("", "b"), "b");
        // 尾部斜杠归一化以内的差异是允许的
        assert_eq!(combine("a", ""), "a/");
    }

    #[test]
    fn test_components() {
        let parts: alloc::vec::Vec<&str> = components("/a//b/c/").collect();
        assert_eq!(parts, ["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
        assert_eq!(components("").count(), 0);
    }
}
