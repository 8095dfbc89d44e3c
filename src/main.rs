fn main() {
    padbridge::run()
}
